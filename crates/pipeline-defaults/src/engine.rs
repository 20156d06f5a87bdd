//! Execution engine seam.
//!
//! The engine runs pipelines; this crate only tells it where a job's pipeline
//! definition comes from. `bind_source` is the single write into the engine's
//! job configuration.

use async_trait::async_trait;
use thiserror::Error;

use crate::binding::ScriptBinding;
use crate::job::ProjectAttributes;

/// Errors reported by an execution engine backend.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine refused to rebind this job.
    #[error("binding rejected for {job}: {reason}")]
    Rejected { job: String, reason: String },

    /// The engine could not be reached.
    #[error("execution engine unavailable: {0}")]
    Unavailable(String),
}

/// Trait for the pipeline execution backend.
///
/// Inject a real implementation that configures the CI host, or
/// [`crate::fakes::MemoryExecutionEngine`] for tests.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Point `job` (its full `container/branch` name) at the registry script
    /// named by `binding`, replacing whatever source it had.
    async fn bind_source(
        &self,
        job: &str,
        binding: &ScriptBinding,
        attributes: &ProjectAttributes,
    ) -> Result<(), EngineError>;

    /// Remove whatever source `job` has, leaving it with nothing to build.
    async fn unbind_source(&self, job: &str) -> Result<(), EngineError>;
}
