//! Owned cache of compiled extension modules.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::config::HostConfig;
use crate::error::{HostError, Result};
use crate::loader::ModuleLoader;
use crate::module::ExtensionModule;

/// File extension recognized when scanning a directory for modules.
const MODULE_FILE_EXTENSION: &str = "rhai";

/// One registered module plus its invocation guard.
///
/// The guard serializes entry-point invocations for this module: the
/// scripting engine backing a module is not assumed thread-safe, so the
/// host treats each module as an actor with a single-writer queue.
/// Different modules never contend with each other.
#[derive(Debug)]
pub(crate) struct ModuleSlot {
    pub(crate) module: ExtensionModule,
    guard: Mutex<()>,
}

impl ModuleSlot {
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        // A poisoned guard only means a previous invocation panicked; the
        // module artifact itself is immutable and still usable.
        self.guard.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Explicitly owned registry of compiled modules.
///
/// Built once from sources or a directory scan; read-only afterwards, so
/// concurrent lookups need no locking. A compile or metadata failure in
/// any source fails construction: a broken extension is fatal, not
/// skippable.
#[derive(Debug)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, ModuleSlot>,
}

impl ModuleRegistry {
    /// Build a registry from (id, source) pairs.
    pub fn from_sources<I, S>(config: &HostConfig, sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let loader = ModuleLoader::new(config.clone());
        let mut modules = BTreeMap::new();
        for (id, source) in sources {
            let id = id.into();
            let module = loader.load(&id, &source.into())?;
            modules.insert(
                id,
                ModuleSlot {
                    module,
                    guard: Mutex::new(()),
                },
            );
        }
        Ok(Self { modules })
    }

    /// Build a registry from every `.rhai` file in a directory.
    ///
    /// The file name becomes the extension id. Files with other extensions
    /// are skipped.
    pub fn from_dir(config: &HostConfig, dir: &Path) -> Result<Self> {
        let mut sources = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MODULE_FILE_EXTENSION) {
                tracing::debug!(path = %path.display(), "skipping non-module file");
                continue;
            }
            let id = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_owned)
                .ok_or_else(|| {
                    HostError::Execution(format!("invalid module file name: {}", path.display()))
                })?;
            sources.push((id, std::fs::read_to_string(&path)?));
        }
        Self::from_sources(config, sources)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Registered extension ids in stable (sorted) order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = &ModuleSlot> {
        self.modules.values()
    }

    pub(crate) fn slot(&self, id: &str) -> Result<&ModuleSlot> {
        self.modules
            .get(id)
            .ok_or_else(|| HostError::ExtensionNotFound(id.to_owned()))
    }
}
