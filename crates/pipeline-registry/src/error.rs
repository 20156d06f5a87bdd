//! Error types for pipeline-registry

use thiserror::Error;

/// Errors that can occur while reading the script registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No script is registered under the identifier
    #[error("script not found: {script_id}")]
    NotFound { script_id: String },

    /// The script exists but could not be read
    #[error("script {script_id} is unreadable: {reason}")]
    Unreadable { script_id: String, reason: String },

    /// The identifier cannot name a registry entry
    #[error("invalid script id: {0:?}")]
    InvalidScriptId(String),

    /// Underlying storage I/O failed
    #[error("registry io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Whether the error means the entry is simply absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}
