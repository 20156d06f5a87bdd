//! Error types for reconciliation and binding.

use thiserror::Error;

use crate::engine::EngineError;

/// Errors produced while materializing branch jobs.
///
/// Every variant is scoped to a single container or branch. The driver records
/// per-branch variants against the branch and keeps going.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The registry could not produce the script the binding names.
    #[error("registry lookup failed for branch {branch} (script {script_id}): {reason}")]
    RegistryLookupFailure {
        branch: String,
        script_id: String,
        reason: String,
    },

    /// A pass is already running for the container (non-blocking entry only).
    #[error("reconciliation already in progress for container {container}")]
    ConcurrentPassConflict { container: String },

    /// The binding cannot be honored as configured.
    #[error("invalid configuration for branch {branch}: {reason}")]
    InvalidConfiguration { branch: String, reason: String },

    /// The execution engine refused the new script source.
    #[error("execution engine rejected binding for {job}: {source}")]
    EngineBindFailure {
        job: String,
        #[source]
        source: EngineError,
    },

    /// The external scanner failed before a pass could start.
    #[error("scan of container {container} failed: {reason}")]
    ScanFailed { container: String, reason: String },

    /// A job with this branch name already exists in the container.
    #[error("duplicate job {branch} in container {container}")]
    DuplicateJob { container: String, branch: String },

    /// No job with this branch name exists in the container.
    #[error("job not found: {container}/{branch}")]
    JobNotFound { container: String, branch: String },

    /// A factory kind was registered twice.
    #[error("factory kind already registered: {0}")]
    DuplicateFactoryKind(String),
}

/// Convenience result alias.
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
