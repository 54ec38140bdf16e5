//! Instance parameter definitions and validation.
//!
//! Definitions are declared by a module per version and are purely
//! declarative: the host validates supplied values against them but never
//! executes anything from a definition.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};

/// Parameter schema declared by a module for one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Stable key used to match supplied values
    pub id: String,
    /// Display name used in error messages
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A value supplied by a caller for one parameter, keyed by definition id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub name: String,
    pub value: String,
}

impl ParameterValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Wire shape handed to a module's `create_instance` entry point.
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct ParameterValues {
    pub values: Vec<ParameterValue>,
}

/// Validate supplied values against the declared definitions.
///
/// Definitions are checked in declaration order and the first violation
/// wins. Supplied values without a matching definition are ignored.
pub fn validate_parameters(
    definitions: &[ParameterDefinition],
    values: &[ParameterValue],
) -> Result<()> {
    for definition in definitions {
        let value = values
            .iter()
            .find(|v| v.name == definition.id)
            .map(|v| v.value.as_str())
            .unwrap_or("");
        if let Some(message) = validate_value(definition, value)? {
            return Err(HostError::Validation {
                name: definition.name.clone(),
                id: definition.id.clone(),
                message,
            });
        }
    }
    Ok(())
}

fn validate_value(definition: &ParameterDefinition, value: &str) -> Result<Option<String>> {
    if value.is_empty() {
        if definition.required {
            return Ok(Some("This is a required parameter.".into()));
        }
        return Ok(None);
    }
    match definition.param_type.as_str() {
        "string" => {
            if let Some(pattern) = &definition.regex {
                let regex = Regex::new(pattern).map_err(|e| {
                    HostError::Execution(format!(
                        "invalid regex {pattern:?} in definition of parameter {:?}: {e}",
                        definition.id
                    ))
                })?;
                if !regex.is_match(value) {
                    return Ok(Some("The value has an invalid format.".into()));
                }
            }
            Ok(None)
        }
        "boolean" => {
            if value == "true" || value == "false" {
                Ok(None)
            } else {
                Ok(Some("Boolean value must be 'true' or 'false'.".into()))
            }
        }
        other => Ok(Some(format!("unsupported parameter type '{other}'"))),
    }
}
