//! Host for sandboxed extension modules that manage database objects.
//!
//! Extensions are Rhai scripts declaring metadata plus a fixed set of
//! lifecycle entry points. The host compiles them once, validates their
//! contract, and drives install, detect, instance management, and upgrade
//! against a caller-supplied database connection. The only host operation
//! reachable from guest code is running a SQL statement through that
//! connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use extension_host::{
//!     ExtensionManager, HostConfig, ModuleRegistry, ParameterValue, SqlClient, SqliteClient,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HostConfig::default();
//!     let registry = ModuleRegistry::from_dir(&config, Path::new("extensions"))?;
//!     let manager = ExtensionManager::new(config, registry);
//!
//!     let client: Arc<dyn SqlClient> = Arc::new(SqliteClient::open_in_memory()?);
//!
//!     manager.install(&client, "s3-vs.rhai", "1.2.0")?;
//!     let instance = manager.create_instance(
//!         &client,
//!         "s3-vs.rhai",
//!         "1.2.0",
//!         &[ParameterValue::new("name", "MY_SCHEMA")],
//!     )?;
//!     println!("created {}", instance.name);
//!
//!     Ok(())
//! }
//! ```

mod capability;
mod config;
mod context;
mod error;
mod loader;
mod manager;
mod marshal;
mod module;
mod params;
mod registry;

pub use capability::{CatalogSnapshot, ScriptRow, SqlClient, SqliteClient};
pub use config::{HostConfig, DEFAULT_MAX_SCRIPT_OPERATIONS};
pub use context::Capability;
pub use error::{ApiError, HostError, Result};
pub use loader::{ModuleLoader, SUPPORTED_API_VERSION};
pub use manager::ExtensionManager;
pub use marshal::{Installation, Instance, UpgradeResult};
pub use module::{ExtensionInfo, ExtensionModule, ExtensionVersion};
pub use params::{ParameterDefinition, ParameterValue};
pub use registry::ModuleRegistry;
