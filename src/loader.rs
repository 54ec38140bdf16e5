//! Compiling extension sources and extracting their declared metadata.

use std::collections::BTreeMap;

use rhai::{Dynamic, Engine, Scope};
use serde::Deserialize;

use crate::config::HostConfig;
use crate::error::{HostError, Result};
use crate::module::{
    ExtensionModule, ExtensionVersion, METADATA_FN_EXTENSION, METADATA_FN_INSTANCE_PARAMETERS,
    REQUIRED_ENTRY_POINTS,
};
use crate::params::ParameterDefinition;

/// Metadata contract version the host understands. A module declaring a
/// different `api_version` is rejected at load time.
pub const SUPPORTED_API_VERSION: &str = "1.0.0";

#[derive(Debug, Deserialize)]
struct RawExtension {
    name: String,
    category: String,
    description: String,
    api_version: String,
    versions: Vec<ExtensionVersion>,
}

/// Compiles extension sources into reusable [`ExtensionModule`] artifacts.
///
/// Compilation happens once per extension; metadata is extracted by
/// evaluating the module's metadata functions in a throwaway scope. The
/// resulting artifact holds no live host resources and is safe to share.
pub struct ModuleLoader {
    config: HostConfig,
}

impl ModuleLoader {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    /// Compile one extension source and extract its metadata.
    pub fn load(&self, id: &str, source: &str) -> Result<ExtensionModule> {
        let engine = self.metadata_engine();
        let ast = engine.compile(source).map_err(|e| HostError::Compile {
            id: id.to_owned(),
            message: e.to_string(),
        })?;
        self.check_entry_points(id, &ast)?;

        let raw = self.read_metadata(&engine, &ast, id)?;
        if raw.api_version != SUPPORTED_API_VERSION {
            return Err(malformed(
                id,
                format!(
                    "incompatible extension API version {:?}, supported version is {:?}",
                    raw.api_version, SUPPORTED_API_VERSION
                ),
            ));
        }
        if raw.versions.is_empty() {
            return Err(malformed(id, "no installable versions declared".into()));
        }
        let latest_count = raw.versions.iter().filter(|v| v.latest).count();
        if latest_count != 1 {
            return Err(malformed(
                id,
                format!("exactly one version must be flagged latest, found {latest_count}"),
            ));
        }

        let mut parameters = BTreeMap::new();
        for version in &raw.versions {
            let definitions = self.read_parameter_definitions(&engine, &ast, id, &version.name)?;
            parameters.insert(version.name.clone(), definitions);
        }

        tracing::debug!(
            extension = raw.name,
            id,
            versions = raw.versions.len(),
            "extension loaded"
        );
        Ok(ExtensionModule {
            id: id.to_owned(),
            name: raw.name,
            category: raw.category,
            description: raw.description,
            versions: raw.versions,
            parameters,
            ast,
        })
    }

    /// Throwaway engine used only for metadata extraction. No capability is
    /// registered: metadata functions must not touch the database.
    fn metadata_engine(&self) -> Engine {
        let mut engine = Engine::new();
        let budget = self.config.max_script_operations();
        engine.on_progress(move |count| {
            if count > budget {
                Some(format!("operation budget of {budget} exceeded").into())
            } else {
                None
            }
        });
        engine
    }

    fn check_entry_points(&self, id: &str, ast: &rhai::AST) -> Result<()> {
        for (name, arity) in REQUIRED_ENTRY_POINTS {
            let declared = ast
                .iter_functions()
                .any(|f| f.name == *name && f.params.len() == *arity);
            if !declared {
                return Err(malformed(
                    id,
                    format!("missing entry point {name:?} with {arity} parameters"),
                ));
            }
        }
        Ok(())
    }

    fn read_metadata(&self, engine: &Engine, ast: &rhai::AST, id: &str) -> Result<RawExtension> {
        let value = self.call_metadata_fn(engine, ast, id, METADATA_FN_EXTENSION, ())?;
        rhai::serde::from_dynamic::<RawExtension>(&value)
            .map_err(|e| malformed(id, format!("invalid extension metadata: {e}")))
    }

    fn read_parameter_definitions(
        &self,
        engine: &Engine,
        ast: &rhai::AST,
        id: &str,
        version: &str,
    ) -> Result<Vec<ParameterDefinition>> {
        let value = self.call_metadata_fn(
            engine,
            ast,
            id,
            METADATA_FN_INSTANCE_PARAMETERS,
            (Dynamic::from(version.to_owned()),),
        )?;
        rhai::serde::from_dynamic::<Vec<ParameterDefinition>>(&value).map_err(|e| {
            malformed(
                id,
                format!("invalid parameter definitions for version {version:?}: {e}"),
            )
        })
    }

    fn call_metadata_fn(
        &self,
        engine: &Engine,
        ast: &rhai::AST,
        id: &str,
        name: &str,
        args: impl rhai::FuncArgs,
    ) -> Result<Dynamic> {
        let mut scope = Scope::new();
        engine
            .call_fn::<Dynamic>(&mut scope, ast, name, args)
            .map_err(|e| malformed(id, format!("failed to read {name:?}: {e}")))
    }
}

fn malformed(id: &str, message: String) -> HostError {
    HostError::MalformedModule {
        id: id.to_owned(),
        message,
    }
}
