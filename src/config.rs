//! Extension host configuration.

use crate::error::{HostError, Result};

/// Default guest operation budget per invocation.
pub const DEFAULT_MAX_SCRIPT_OPERATIONS: u64 = 100_000;

/// Configuration for the extension host.
///
/// Immutable after construction; use [`HostConfig::new`] which fails fast
/// on invalid values instead of deferring errors to the first invocation.
#[derive(Debug, Clone)]
pub struct HostConfig {
    max_script_operations: u64,
}

impl HostConfig {
    /// Create a configuration with an explicit guest operation budget.
    ///
    /// The budget bounds how many engine operations a single entry-point
    /// invocation may perform before it is aborted with an execution error,
    /// so a runaway script cannot hang the host.
    pub fn new(max_script_operations: u64) -> Result<Self> {
        if max_script_operations == 0 {
            return Err(HostError::Execution(
                "max_script_operations must be greater than zero".into(),
            ));
        }
        Ok(Self {
            max_script_operations,
        })
    }

    /// Guest operation budget per invocation.
    pub fn max_script_operations(&self) -> u64 {
        self.max_script_operations
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_script_operations: DEFAULT_MAX_SCRIPT_OPERATIONS,
        }
    }
}
