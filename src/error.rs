//! Error types for extension host operations.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while loading or driving an extension module.
///
/// Every failure that leaves the host is classified into exactly one of
/// these kinds; there is no automatic retry and no partial success.
#[derive(Debug, Error)]
pub enum HostError {
    /// Extension source failed to compile. Fatal: the extension is
    /// unusable until its source is fixed.
    #[error("failed to compile extension {id:?}: {message}")]
    Compile { id: String, message: String },

    /// Compiled module lacks a required export or declares invalid
    /// metadata. Fatal, same as a compile failure.
    #[error("malformed extension {id:?}: {message}")]
    MalformedModule { id: String, message: String },

    /// No extension with the given id is registered
    #[error("extension {0:?} not found")]
    ExtensionNotFound(String),

    /// Requested version is not among the declared installable versions
    #[error("Version '{version}' not supported, can only use '{declared}'.")]
    UnknownVersion { version: String, declared: String },

    /// A supplied parameter value failed its declared validation rule
    #[error("invalid parameters: Failed to validate parameter '{name}': {message}")]
    Validation {
        /// Display name of the first failing parameter
        name: String,
        /// Stable id of the first failing parameter
        id: String,
        /// The specific rule that was violated
        message: String,
    },

    /// Duplicate instance name or uninstall attempted while instances exist
    #[error("{0}")]
    Conflict(String),

    /// Upgrade attempted with a missing prerequisite installation or while
    /// already at the latest version
    #[error("{0}")]
    Precondition(String),

    /// Guest code raised an error or the underlying database call failed
    #[error("{0}")]
    Execution(String),

    /// Guest return value is missing an expected field
    #[error("{0}")]
    Marshaling(String),

    /// IO error while scanning an extension directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// HTTP-equivalent status code used in the external error payload.
    pub fn code(&self) -> u16 {
        match self {
            HostError::ExtensionNotFound(_) | HostError::UnknownVersion { .. } => 404,
            HostError::Validation { .. } | HostError::Conflict(_) => 400,
            HostError::Precondition(_) => 412,
            HostError::Compile { .. }
            | HostError::MalformedModule { .. }
            | HostError::Execution(_)
            | HostError::Marshaling(_)
            | HostError::Io(_) => 500,
        }
    }
}

/// Error payload surfaced to external callers.
///
/// Callers only ever see the message/code pair; internal details stay on
/// the host side.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub message: String,
    pub code: u16,
}

impl From<&HostError> for ApiError {
    fn from(err: &HostError) -> Self {
        Self {
            message: err.to_string(),
            code: err.code(),
        }
    }
}

/// Result type for extension host operations
pub type Result<T> = std::result::Result<T, HostError>;
