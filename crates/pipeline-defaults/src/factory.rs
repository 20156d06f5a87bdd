//! Project factory for branches built from the registry default script.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binding::ScriptBinding;
use crate::engine::ExecutionEngine;
use crate::error::ReconcileResult;
use crate::job::{apply_binding, Job, JobKind, ProjectAttributes};
use crate::policy::DefaultResolutionPolicy;

/// Materializes branch jobs bound to a registry script.
///
/// Owns the container's `(script_id, use_sandbox)` configuration. Jobs receive
/// a value copy of it each time they are created or updated, so a
/// configuration change reaches existing jobs on their next pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectFactory {
    binding: ScriptBinding,
}

impl ProjectFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the registry script jobs are bound to. `None` or blank input
    /// selects [`crate::DEFAULT_SCRIPT_ID`].
    pub fn set_script_id(&mut self, script_id: Option<&str>) {
        self.binding.set_script_id(script_id);
    }

    pub fn script_id(&self) -> &str {
        self.binding.script_id()
    }

    /// Set whether bound scripts run in the sandbox (`true`) or trusted.
    pub fn set_use_sandbox(&mut self, use_sandbox: bool) {
        self.binding.set_use_sandbox(use_sandbox);
    }

    pub fn use_sandbox(&self) -> bool {
        self.binding.use_sandbox()
    }

    /// Snapshot of the current binding.
    pub fn binding(&self) -> ScriptBinding {
        self.binding.clone()
    }

    /// Criteria used to qualify scanned branches.
    pub fn criteria(&self) -> DefaultResolutionPolicy {
        DefaultResolutionPolicy
    }

    /// Create a new pipeline job named `name` under `parent` and bind it.
    ///
    /// Callers guarantee this runs at most once per `(parent, name)`; the
    /// driver enforces that through the container's job map.
    pub async fn create_project(
        &self,
        engine: &dyn ExecutionEngine,
        parent: &str,
        name: &str,
        attributes: &ProjectAttributes,
    ) -> ReconcileResult<Job> {
        let job = Job::new(parent, name, JobKind::Pipeline);
        apply_binding(engine, &job, &self.binding, attributes).await?;
        debug!(job = %job.full_name(), binding = %self.binding, "project created");
        Ok(job)
    }

    /// Re-apply the current binding to an existing job.
    ///
    /// Returns `Ok(false)` without touching the job when it is not a pipeline
    /// job. Safe to call on every pass: rebinding with an unchanged
    /// configuration leaves the job with the same binding.
    pub async fn update_existing_project(
        &self,
        engine: &dyn ExecutionEngine,
        project: &Job,
        attributes: &ProjectAttributes,
    ) -> ReconcileResult<bool> {
        if *project.kind() != JobKind::Pipeline {
            debug!(
                job = %project.full_name(),
                kind = ?project.kind(),
                "skipping incompatible project"
            );
            return Ok(false);
        }
        apply_binding(engine, project, &self.binding, attributes).await?;
        Ok(true)
    }
}
