//! Single-use execution contexts for entry-point invocations.
//!
//! Every invocation gets a fresh engine and scope so no guest state leaks
//! from one caller's request into another's. The only host operation
//! reachable from guest code is [`Capability::run_query`]; the engine
//! registers nothing else.

use std::sync::Arc;

use rhai::{Dynamic, Engine, EvalAltResult, FuncArgs, Scope};

use crate::capability::{CatalogSnapshot, SqlClient};
use crate::config::HostConfig;
use crate::error::{HostError, Result};
use crate::marshal::{self, Installation, Instance, UpgradeResult};
use crate::module::ExtensionModule;
use crate::params::ParameterValues;

/// The capability surface handed to every entry point as first argument.
///
/// Exposes exactly one operation: execute a SQL statement against the
/// caller's connection. No result is surfaced to the guest; a database
/// failure propagates out of the invocation as an execution error.
#[derive(Clone)]
pub struct Capability {
    client: Arc<dyn SqlClient>,
}

impl Capability {
    pub(crate) fn new(client: Arc<dyn SqlClient>) -> Self {
        Self { client }
    }

    fn run_query(&mut self, sql: &str) -> std::result::Result<(), Box<EvalAltResult>> {
        tracing::trace!(sql, "guest query");
        self.client
            .execute(sql)
            .map_err(|e| e.to_string().into())
    }
}

/// One fresh binding environment pairing a compiled module with a
/// capability. Never reused: every entry-point method consumes the context.
pub struct ExecutionContext<'m> {
    engine: Engine,
    module: &'m ExtensionModule,
    capability: Capability,
}

impl<'m> ExecutionContext<'m> {
    pub(crate) fn new(
        config: &HostConfig,
        module: &'m ExtensionModule,
        capability: Capability,
    ) -> Self {
        let mut engine = Engine::new();
        let budget = config.max_script_operations();
        engine.on_progress(move |count| {
            if count > budget {
                Some(format!("operation budget of {budget} exceeded").into())
            } else {
                None
            }
        });
        engine
            .register_type_with_name::<Capability>("Capability")
            .register_fn("run_query", Capability::run_query);
        Self {
            engine,
            module,
            capability,
        }
    }

    pub(crate) fn install(self, version: &str) -> Result<()> {
        let args = (self.capability_arg(), Dynamic::from(version.to_owned()));
        self.invoke("install", args)?;
        Ok(())
    }

    pub(crate) fn uninstall(self, version: &str) -> Result<()> {
        let args = (self.capability_arg(), Dynamic::from(version.to_owned()));
        self.invoke("uninstall", args)?;
        Ok(())
    }

    pub(crate) fn find_installations(self, snapshot: &CatalogSnapshot) -> Result<Vec<Installation>> {
        let id = self.module.id().to_owned();
        let args = (self.capability_arg(), marshal::to_guest(snapshot)?);
        let result = self.invoke("find_installations", args)?;
        marshal::installations_from(result, &id)
    }

    pub(crate) fn upgrade(self) -> Result<UpgradeResult> {
        let args = (self.capability_arg(),);
        let result = self.invoke("upgrade", args)?;
        marshal::upgrade_result_from(result)
    }

    pub(crate) fn create_instance(self, version: &str, params: &ParameterValues) -> Result<Instance> {
        let args = (
            self.capability_arg(),
            Dynamic::from(version.to_owned()),
            marshal::to_guest(params)?,
        );
        let result = self.invoke("create_instance", args)?;
        marshal::instance_from(result)
    }

    pub(crate) fn list_instances(
        self,
        version: &str,
        snapshot: &CatalogSnapshot,
    ) -> Result<Vec<Instance>> {
        let args = (
            self.capability_arg(),
            Dynamic::from(version.to_owned()),
            marshal::to_guest(snapshot)?,
        );
        let result = self.invoke("list_instances", args)?;
        marshal::instances_from(result)
    }

    pub(crate) fn delete_instance(self, version: &str, instance_id: &str) -> Result<()> {
        let args = (
            self.capability_arg(),
            Dynamic::from(version.to_owned()),
            Dynamic::from(instance_id.to_owned()),
        );
        self.invoke("delete_instance", args)?;
        Ok(())
    }

    fn capability_arg(&self) -> Dynamic {
        Dynamic::from(self.capability.clone())
    }

    /// Call one entry point with a fresh scope, consuming the context.
    fn invoke(self, entry_point: &str, args: impl FuncArgs) -> Result<Dynamic> {
        let mut scope = Scope::new();
        self.engine
            .call_fn::<Dynamic>(&mut scope, &self.module.ast, entry_point, args)
            .map_err(|e| classify(self.module.id(), entry_point, e))
    }
}

fn classify(module_id: &str, entry_point: &str, error: Box<EvalAltResult>) -> HostError {
    match *error {
        EvalAltResult::ErrorFunctionNotFound(ref signature, _)
            if signature.split(' ').next() == Some(entry_point) =>
        {
            HostError::MalformedModule {
                id: module_id.to_owned(),
                message: format!("missing entry point {entry_point:?}"),
            }
        }
        other => HostError::Execution(format!(
            "invocation of {entry_point:?} in extension {module_id:?} failed: {other}"
        )),
    }
}
