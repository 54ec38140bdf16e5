//! Lifecycle orchestrator for registered extension modules.
//!
//! The manager holds no durable state of its own: every installed/exists
//! fact is re-derived per call by invoking the module against the current
//! catalog snapshot. It enforces the lifecycle preconditions, serializes
//! invocations per module, and classifies every failure before it leaves
//! the host.

use std::sync::Arc;

use crate::capability::SqlClient;
use crate::config::HostConfig;
use crate::context::{Capability, ExecutionContext};
use crate::error::{HostError, Result};
use crate::marshal::{Installation, Instance, UpgradeResult};
use crate::module::{ExtensionInfo, ExtensionModule};
use crate::params::{validate_parameters, ParameterDefinition, ParameterValue, ParameterValues};
use crate::registry::{ModuleRegistry, ModuleSlot};

/// Drives registered extension modules through their lifecycle.
pub struct ExtensionManager {
    config: HostConfig,
    registry: ModuleRegistry,
}

impl ExtensionManager {
    pub fn new(config: HostConfig, registry: ModuleRegistry) -> Self {
        Self { config, registry }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    // === Catalog ===

    /// Metadata for every registered extension, in stable id order.
    pub fn list_extensions(&self) -> Vec<ExtensionInfo> {
        self.registry
            .slots()
            .map(|slot| ExtensionInfo::from(&slot.module))
            .collect()
    }

    /// Parameter definitions declared for one extension version.
    pub fn get_extension_details(&self, id: &str, version: &str) -> Result<Vec<ParameterDefinition>> {
        let slot = self.registry.slot(id)?;
        self.ensure_version_declared(&slot.module, version)?;
        Ok(slot
            .module
            .parameter_definitions(version)
            .unwrap_or_default()
            .to_vec())
    }

    // === Installations ===

    /// Detected installations across all registered extensions.
    pub fn list_installations(&self, client: &Arc<dyn SqlClient>) -> Result<Vec<Installation>> {
        let snapshot = client.script_catalog()?;
        let mut installations = Vec::new();
        for slot in self.registry.slots() {
            let _guard = slot.lock();
            installations.extend(self.context(slot, client).find_installations(&snapshot)?);
        }
        Ok(installations)
    }

    /// Install one extension version.
    ///
    /// Repeated installs are passed through to the module unchanged;
    /// making them safe is the module's responsibility.
    pub fn install(&self, client: &Arc<dyn SqlClient>, id: &str, version: &str) -> Result<()> {
        let slot = self.registry.slot(id)?;
        self.ensure_version_declared(&slot.module, version)?;
        let _guard = slot.lock();
        tracing::debug!(extension = id, version, "installing");
        self.context(slot, client).install(version)
    }

    /// Uninstall one extension version.
    ///
    /// Fails while instances still exist; a no-op when nothing is
    /// installed (the module decides, the host does not track state).
    pub fn uninstall(&self, client: &Arc<dyn SqlClient>, id: &str, version: &str) -> Result<()> {
        let slot = self.registry.slot(id)?;
        let _guard = slot.lock();
        let snapshot = client.script_catalog()?;
        let instances = self.context(slot, client).list_instances(version, &snapshot)?;
        if !instances.is_empty() {
            let names = instances
                .iter()
                .map(|i| format!("'{}'", i.name))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(HostError::Conflict(format!(
                "cannot uninstall extension '{}', instances still exist: {names}",
                slot.module.name()
            )));
        }
        tracing::debug!(extension = id, version, "uninstalling");
        self.context(slot, client).uninstall(version)
    }

    /// Upgrade an installed extension to the latest declared version.
    ///
    /// Requires exactly one installed version that differs from the
    /// version flagged latest. Latest is never inferred from version
    /// ordering.
    pub fn upgrade(&self, client: &Arc<dyn SqlClient>, id: &str) -> Result<UpgradeResult> {
        let slot = self.registry.slot(id)?;
        let _guard = slot.lock();
        let snapshot = client.script_catalog()?;
        let installations = self.context(slot, client).find_installations(&snapshot)?;
        let module = &slot.module;
        let installed = match installations.as_slice() {
            [] => {
                return Err(HostError::Precondition(format!(
                    "Not all required scripts are installed: script '{}' is missing",
                    module.name()
                )))
            }
            [single] => single,
            multiple => {
                return Err(HostError::Precondition(format!(
                    "expected exactly one installation of extension '{}', found {}",
                    module.name(),
                    multiple.len()
                )))
            }
        };
        let latest = module.latest_version();
        if installed.version == latest.name {
            return Err(HostError::Precondition(format!(
                "Extension is already installed in latest version {}",
                latest.name
            )));
        }
        tracing::debug!(
            extension = id,
            from = installed.version,
            to = latest.name,
            "upgrading"
        );
        self.context(slot, client).upgrade()
    }

    // === Instances ===

    /// Validate parameters and create a new instance.
    pub fn create_instance(
        &self,
        client: &Arc<dyn SqlClient>,
        id: &str,
        version: &str,
        values: &[ParameterValue],
    ) -> Result<Instance> {
        let slot = self.registry.slot(id)?;
        self.ensure_version_declared(&slot.module, version)?;
        let definitions = slot.module.parameter_definitions(version).unwrap_or_default();
        validate_parameters(definitions, values)?;

        let _guard = slot.lock();
        let snapshot = client.script_catalog()?;
        let existing = self.context(slot, client).list_instances(version, &snapshot)?;
        // The host cannot know which parameter carries the instance name,
        // so any supplied value colliding with an existing name counts.
        for value in values {
            if let Some(collision) = existing
                .iter()
                .find(|i| i.name.to_lowercase() == value.value.to_lowercase())
            {
                return Err(HostError::Conflict(format!(
                    "Virtual Schema '{}' already exists",
                    collision.name
                )));
            }
        }

        let params = ParameterValues {
            values: values.to_vec(),
        };
        tracing::debug!(extension = id, version, "creating instance");
        self.context(slot, client).create_instance(version, &params)
    }

    /// Instances of one extension version, in creation order.
    pub fn list_instances(
        &self,
        client: &Arc<dyn SqlClient>,
        id: &str,
        version: &str,
    ) -> Result<Vec<Instance>> {
        let slot = self.registry.slot(id)?;
        let _guard = slot.lock();
        let snapshot = client.script_catalog()?;
        self.context(slot, client).list_instances(version, &snapshot)
    }

    /// Delete one instance. A no-op when the instance is already gone.
    pub fn delete_instance(
        &self,
        client: &Arc<dyn SqlClient>,
        id: &str,
        version: &str,
        instance_id: &str,
    ) -> Result<()> {
        let slot = self.registry.slot(id)?;
        let _guard = slot.lock();
        tracing::debug!(extension = id, version, instance_id, "deleting instance");
        self.context(slot, client).delete_instance(version, instance_id)
    }

    // === Helpers ===

    fn context<'m>(&self, slot: &'m ModuleSlot, client: &Arc<dyn SqlClient>) -> ExecutionContext<'m> {
        ExecutionContext::new(&self.config, &slot.module, Capability::new(client.clone()))
    }

    fn ensure_version_declared(&self, module: &ExtensionModule, version: &str) -> Result<()> {
        if module.has_version(version) {
            return Ok(());
        }
        Err(HostError::UnknownVersion {
            version: version.to_owned(),
            declared: module.declared_versions_list(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SqliteClient;
    use crate::error::ApiError;

    const TESTING_EXTENSION: &str = r#"
        fn extension() {
            #{
                name: "Testing Extension",
                category: "testing",
                description: "Extension for lifecycle tests",
                api_version: "1.0.0",
                versions: [
                    #{ name: "0.1.0", latest: false, deprecated: true },
                    #{ name: "0.2.0", latest: true, deprecated: false },
                ],
            }
        }

        fn instance_parameters(version) {
            [ #{ id: "param1", name: "Param 1", "type": "string", required: true } ]
        }

        fn install(ctx, version) {
            ctx.run_query("CREATE TABLE IF NOT EXISTS \"TESTING_SCRIPT_" + version + "\" (id INTEGER)");
        }

        fn uninstall(ctx, version) {
            ctx.run_query("DROP TABLE IF EXISTS \"TESTING_SCRIPT_" + version + "\"");
        }

        fn find_installations(ctx, snapshot) {
            let found = [];
            for script in snapshot.scripts {
                if script.name.starts_with("TESTING_SCRIPT_") {
                    found.push(#{
                        name: "Testing Extension",
                        version: script.name.sub_string(15),
                    });
                }
            }
            found
        }

        fn upgrade(ctx) {
            ctx.run_query("ALTER TABLE \"TESTING_SCRIPT_0.1.0\" RENAME TO \"TESTING_SCRIPT_0.2.0\"");
            #{ previous_version: "0.1.0", new_version: "0.2.0" }
        }

        fn create_instance(ctx, version, params) {
            let name = "";
            for p in params.values {
                if p.name == "param1" { name = p.value; }
            }
            ctx.run_query("CREATE TABLE \"TESTING_VS_" + name + "\" (id INTEGER)");
            #{ id: name, name: name }
        }

        fn list_instances(ctx, version, snapshot) {
            let found = [];
            for script in snapshot.scripts {
                if script.name.starts_with("TESTING_VS_") {
                    let name = script.name.sub_string(11);
                    found.push(#{ id: name, name: name });
                }
            }
            found
        }

        fn delete_instance(ctx, version, instance_id) {
            ctx.run_query("DROP TABLE IF EXISTS \"TESTING_VS_" + instance_id + "\"");
        }
    "#;

    const ID: &str = "testing.rhai";

    fn manager() -> ExtensionManager {
        let config = HostConfig::default();
        let registry =
            ModuleRegistry::from_sources(&config, vec![(ID, TESTING_EXTENSION)]).unwrap();
        ExtensionManager::new(config, registry)
    }

    fn client() -> Arc<dyn SqlClient> {
        Arc::new(SqliteClient::open_in_memory().unwrap())
    }

    fn params(value: &str) -> Vec<ParameterValue> {
        vec![ParameterValue::new("param1", value)]
    }

    #[test]
    fn lists_extension_metadata() {
        let manager = manager();
        let extensions = manager.list_extensions();
        assert_eq!(extensions.len(), 1);
        assert_eq!(extensions[0].id, ID);
        assert_eq!(extensions[0].name, "Testing Extension");
        assert_eq!(extensions[0].category, "testing");
        let versions: Vec<&str> = extensions[0].versions.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(versions, vec!["0.1.0", "0.2.0"]);
    }

    #[test]
    fn extension_details_report_parameters() {
        let manager = manager();
        let details = manager.get_extension_details(ID, "0.2.0").unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].id, "param1");
    }

    #[test]
    fn unknown_version_is_rejected() {
        let manager = manager();
        let err = manager.get_extension_details(ID, "9.9.9").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Version '9.9.9' not supported, can only use '0.1.0', '0.2.0'."
        );
        assert_eq!(err.code(), 404);

        let client = client();
        let err = manager.install(&client, ID, "9.9.9").unwrap_err();
        assert!(matches!(err, HostError::UnknownVersion { .. }));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let manager = manager();
        let err = manager.get_extension_details("missing.rhai", "0.1.0").unwrap_err();
        assert!(matches!(err, HostError::ExtensionNotFound(_)));
        assert_eq!(err.code(), 404);
    }

    #[test]
    fn install_is_idempotent() {
        let manager = manager();
        let client = client();
        manager.install(&client, ID, "0.2.0").unwrap();
        manager.install(&client, ID, "0.2.0").unwrap();

        let installations = manager.list_installations(&client).unwrap();
        assert_eq!(installations.len(), 1);
        assert_eq!(installations[0].name, "Testing Extension");
        assert_eq!(installations[0].version, "0.2.0");
        assert_eq!(installations[0].extension_id, ID);
    }

    #[test]
    fn detects_manually_created_installation() {
        let manager = manager();
        let client = client();
        client
            .execute("CREATE TABLE \"TESTING_SCRIPT_0.2.0\" (id INTEGER)")
            .unwrap();

        let installations = manager.list_installations(&client).unwrap();
        assert_eq!(installations.len(), 1);
        assert_eq!(installations[0].version, "0.2.0");
    }

    #[test]
    fn uninstall_without_install_is_a_noop() {
        let manager = manager();
        let client = client();
        manager.uninstall(&client, ID, "0.2.0").unwrap();
    }

    #[test]
    fn uninstall_removes_the_installation() {
        let manager = manager();
        let client = client();
        manager.install(&client, ID, "0.2.0").unwrap();
        manager.uninstall(&client, ID, "0.2.0").unwrap();
        assert!(manager.list_installations(&client).unwrap().is_empty());
    }

    #[test]
    fn uninstall_fails_while_instances_exist() {
        let manager = manager();
        let client = client();
        manager.install(&client, ID, "0.2.0").unwrap();
        manager
            .create_instance(&client, ID, "0.2.0", &params("my_VS"))
            .unwrap();

        let err = manager.uninstall(&client, ID, "0.2.0").unwrap_err();
        assert!(matches!(err, HostError::Conflict(_)));
        assert!(err.to_string().contains("'my_VS'"));
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn create_instance_requires_parameters() {
        let manager = manager();
        let client = client();
        manager.install(&client, ID, "0.2.0").unwrap();

        let err = manager.create_instance(&client, ID, "0.2.0", &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid parameters: Failed to validate parameter 'Param 1': This is a required parameter."
        );
        let payload = ApiError::from(&err);
        assert_eq!(payload.code, 400);
    }

    #[test]
    fn create_and_list_instances() {
        let manager = manager();
        let client = client();
        manager.install(&client, ID, "0.2.0").unwrap();

        let instance = manager
            .create_instance(&client, ID, "0.2.0", &params("value1"))
            .unwrap();
        assert_eq!(instance.name, "value1");

        let instances = manager.list_instances(&client, ID, "0.2.0").unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name, "value1");
    }

    #[test]
    fn instances_keep_creation_order() {
        let manager = manager();
        let client = client();
        manager.install(&client, ID, "0.2.0").unwrap();
        manager
            .create_instance(&client, ID, "0.2.0", &params("vs_b"))
            .unwrap();
        manager
            .create_instance(&client, ID, "0.2.0", &params("vs_a"))
            .unwrap();

        let names: Vec<String> = manager
            .list_instances(&client, ID, "0.2.0")
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["vs_b", "vs_a"]);
    }

    #[test]
    fn duplicate_instance_name_differing_only_by_case() {
        let manager = manager();
        let client = client();
        manager.install(&client, ID, "0.2.0").unwrap();
        manager
            .create_instance(&client, ID, "0.2.0", &params("my_VS"))
            .unwrap();

        let err = manager
            .create_instance(&client, ID, "0.2.0", &params("MY_vs"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Virtual Schema 'my_VS' already exists");
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn delete_instance_and_absent_instance_noop() {
        let manager = manager();
        let client = client();
        manager.install(&client, ID, "0.2.0").unwrap();
        manager
            .create_instance(&client, ID, "0.2.0", &params("my_VS"))
            .unwrap();

        manager.delete_instance(&client, ID, "0.2.0", "my_VS").unwrap();
        assert!(manager.list_instances(&client, ID, "0.2.0").unwrap().is_empty());

        // Already gone: still not an error.
        manager.delete_instance(&client, ID, "0.2.0", "my_VS").unwrap();
    }

    #[test]
    fn upgrade_requires_an_installation() {
        let manager = manager();
        let client = client();
        let err = manager.upgrade(&client, ID).unwrap_err();
        assert!(matches!(err, HostError::Precondition(_)));
        let message = err.to_string();
        assert!(message.contains("Not all required scripts are installed"));
        assert!(message.contains("is missing"));
        assert_eq!(err.code(), 412);
    }

    #[test]
    fn upgrade_rejects_latest_version() {
        let manager = manager();
        let client = client();
        manager.install(&client, ID, "0.2.0").unwrap();

        let err = manager.upgrade(&client, ID).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Extension is already installed in latest version 0.2.0"
        );
        assert_eq!(err.code(), 412);
    }

    #[test]
    fn upgrade_moves_installation_and_keeps_instances() {
        let manager = manager();
        let client = client();
        manager.install(&client, ID, "0.1.0").unwrap();
        manager
            .create_instance(&client, ID, "0.1.0", &params("my_VS"))
            .unwrap();

        let result = manager.upgrade(&client, ID).unwrap();
        assert_eq!(result.previous_version, "0.1.0");
        assert_eq!(result.new_version, "0.2.0");

        let installations = manager.list_installations(&client).unwrap();
        assert_eq!(installations.len(), 1);
        assert_eq!(installations[0].version, "0.2.0");

        // The instance created under the previous version is preserved,
        // not recreated.
        let instances = manager.list_instances(&client, ID, "0.2.0").unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name, "my_VS");
    }

    #[test]
    fn guest_failure_surfaces_as_execution_error() {
        let broken = TESTING_EXTENSION.replace(
            "fn install(ctx, version) {",
            "fn install(ctx, version) { throw \"install exploded\";",
        );
        let config = HostConfig::default();
        let registry =
            ModuleRegistry::from_sources(&config, vec![(ID, broken.as_str())]).unwrap();
        let manager = ExtensionManager::new(config, registry);
        let client = client();

        let err = manager.install(&client, ID, "0.2.0").unwrap_err();
        assert!(matches!(err, HostError::Execution(_)));
        assert!(err.to_string().contains("install exploded"));
        assert_eq!(ApiError::from(&err).code, 500);
    }
}
