//! Compiled extension module artifacts.

use std::collections::BTreeMap;

use rhai::AST;
use serde::{Deserialize, Serialize};

use crate::params::ParameterDefinition;

/// Entry points every extension module must declare, with their arity
/// (the capability counts as one argument).
pub(crate) const REQUIRED_ENTRY_POINTS: &[(&str, usize)] = &[
    ("install", 2),
    ("uninstall", 2),
    ("find_installations", 2),
    ("upgrade", 1),
    ("create_instance", 3),
    ("list_instances", 3),
    ("delete_instance", 3),
];

/// Metadata functions evaluated once at load time, with their arity.
pub(crate) const METADATA_FN_EXTENSION: &str = "extension";
pub(crate) const METADATA_FN_INSTANCE_PARAMETERS: &str = "instance_parameters";

/// One declared installable version of an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionVersion {
    pub name: String,
    #[serde(default)]
    pub latest: bool,
    #[serde(default)]
    pub deprecated: bool,
}

/// Immutable compiled artifact for one extension source.
///
/// Created once by the loader, cached by the registry, and reused
/// read-only for the process lifetime. Holds no live host resources, so it
/// is safe to share across any number of execution contexts.
#[derive(Debug)]
pub struct ExtensionModule {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) category: String,
    pub(crate) description: String,
    pub(crate) versions: Vec<ExtensionVersion>,
    pub(crate) parameters: BTreeMap<String, Vec<ParameterDefinition>>,
    pub(crate) ast: AST,
}

impl ExtensionModule {
    /// Opaque extension id, e.g. the source file name.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared installable versions, in declaration order.
    pub fn versions(&self) -> &[ExtensionVersion] {
        &self.versions
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v.name == version)
    }

    /// The version explicitly flagged latest. The loader guarantees
    /// exactly one.
    pub fn latest_version(&self) -> &ExtensionVersion {
        self.versions
            .iter()
            .find(|v| v.latest)
            .unwrap_or(&self.versions[0])
    }

    /// Parameter definitions declared for one version.
    pub fn parameter_definitions(&self, version: &str) -> Option<&[ParameterDefinition]> {
        self.parameters.get(version).map(|defs| defs.as_slice())
    }

    /// Declared version names joined for error messages.
    pub(crate) fn declared_versions_list(&self) -> String {
        self.versions
            .iter()
            .map(|v| v.name.as_str())
            .collect::<Vec<_>>()
            .join("', '")
    }
}

/// Extension metadata surfaced by the list operation.
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionInfo {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub versions: Vec<ExtensionVersion>,
}

impl From<&ExtensionModule> for ExtensionInfo {
    fn from(module: &ExtensionModule) -> Self {
        Self {
            id: module.id.clone(),
            name: module.name.clone(),
            category: module.category.clone(),
            description: module.description.clone(),
            versions: module.versions.clone(),
        }
    }
}
