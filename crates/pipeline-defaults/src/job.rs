//! Branch jobs and their script source.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::binding::ScriptBinding;
use crate::engine::ExecutionEngine;
use crate::error::{ReconcileError, ReconcileResult};

/// What kind of project a job is. Only pipeline jobs are rebound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Pipeline,
    Other(String),
}

/// Attributes handed to project creation and update.
///
/// Recognized keys are typed fields; everything else travels in `extra`. The
/// resolution engine passes the whole structure through to the execution
/// engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectAttributes {
    /// Human-readable name for the branch job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Head revision the scan observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_revision: Option<String>,

    /// Unrecognized attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The pipeline-definition provider installed on a job.
///
/// Immutable once built; rebinding replaces the whole provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSource {
    pub binding: ScriptBinding,
    pub bound_at: DateTime<Utc>,
}

impl ScriptSource {
    pub fn new(binding: ScriptBinding) -> Self {
        Self {
            binding,
            bound_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct JobStatus {
    last_materialized_at: u64,
    disabled: bool,
    missed_passes: u32,
    last_error: Option<String>,
}

/// Serializable view of a job, used to persist container state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub branch_name: String,
    pub kind: JobKind,
    pub source: Option<ScriptSource>,
    pub last_materialized_at: u64,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub missed_passes: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// One buildable job per branch in a multi-branch container.
///
/// The script source sits behind its own lock and is swapped as a whole, so a
/// build trigger reading it sees either the old or the new binding.
#[derive(Debug)]
pub struct Job {
    id: Uuid,
    parent: String,
    branch_name: String,
    kind: JobKind,
    source: RwLock<Option<Arc<ScriptSource>>>,
    status: Mutex<JobStatus>,
}

impl Job {
    /// Create an empty, unbound job under `parent`.
    pub fn new(parent: impl Into<String>, branch_name: impl Into<String>, kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent: parent.into(),
            branch_name: branch_name.into(),
            kind,
            source: RwLock::new(None),
            status: Mutex::new(JobStatus::default()),
        }
    }

    /// Rebuild a job from persisted state.
    pub fn from_snapshot(parent: impl Into<String>, snapshot: JobSnapshot) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent: parent.into(),
            branch_name: snapshot.branch_name,
            kind: snapshot.kind,
            source: RwLock::new(snapshot.source.map(Arc::new)),
            status: Mutex::new(JobStatus {
                last_materialized_at: snapshot.last_materialized_at,
                disabled: snapshot.disabled,
                missed_passes: snapshot.missed_passes,
                last_error: snapshot.last_error,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn branch_name(&self) -> &str {
        &self.branch_name
    }

    /// `container/branch`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.parent, self.branch_name)
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    /// Current script source, if the job has ever been bound.
    pub fn script_source(&self) -> Option<Arc<ScriptSource>> {
        self.source.read().unwrap().clone()
    }

    pub fn binding(&self) -> Option<ScriptBinding> {
        self.script_source().map(|s| s.binding.clone())
    }

    pub fn is_bound(&self) -> bool {
        self.source.read().unwrap().is_some()
    }

    pub fn is_disabled(&self) -> bool {
        self.status.lock().unwrap().disabled
    }

    pub fn missed_passes(&self) -> u32 {
        self.status.lock().unwrap().missed_passes
    }

    /// Sequence number of the last pass that bound this job.
    pub fn last_materialized_at(&self) -> u64 {
        self.status.lock().unwrap().last_materialized_at
    }

    pub fn last_error(&self) -> Option<String> {
        self.status.lock().unwrap().last_error.clone()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let status = self.status.lock().unwrap().clone();
        JobSnapshot {
            branch_name: self.branch_name.clone(),
            kind: self.kind.clone(),
            source: self.script_source().map(|s| (*s).clone()),
            last_materialized_at: status.last_materialized_at,
            disabled: status.disabled,
            missed_passes: status.missed_passes,
            last_error: status.last_error,
        }
    }

    /// Swap in a new provider, returning the one it replaced.
    fn install_source(&self, source: Arc<ScriptSource>) -> Option<Arc<ScriptSource>> {
        let mut slot = self.source.write().unwrap();
        slot.replace(source)
    }

    fn clear_source(&self) -> Option<Arc<ScriptSource>> {
        self.source.write().unwrap().take()
    }

    /// Record a successful bind in `pass`. Returns `true` if the job was
    /// disabled and has now been re-enabled.
    pub(crate) fn mark_materialized(&self, pass: u64) -> bool {
        let mut status = self.status.lock().unwrap();
        let reenabled = status.disabled;
        status.last_materialized_at = pass;
        status.disabled = false;
        status.missed_passes = 0;
        status.last_error = None;
        reenabled
    }

    /// Record a failure against a branch that is still present.
    pub(crate) fn record_failure(&self, error: &ReconcileError) {
        let mut status = self.status.lock().unwrap();
        status.missed_passes = 0;
        status.last_error = Some(error.to_string());
    }

    /// Count one pass in which the branch was absent.
    pub(crate) fn record_miss(&self) -> u32 {
        let mut status = self.status.lock().unwrap();
        status.missed_passes = status.missed_passes.saturating_add(1);
        status.missed_passes
    }

    pub(crate) fn disable(&self) {
        self.status.lock().unwrap().disabled = true;
    }
}

/// Drop the job's script source, telling the engine first.
///
/// No-op for a job that was never bound.
pub(crate) async fn clear_binding(
    engine: &dyn ExecutionEngine,
    job: &Job,
) -> ReconcileResult<()> {
    if !job.is_bound() {
        return Ok(());
    }
    let job_name = job.full_name();
    engine
        .unbind_source(&job_name)
        .await
        .map_err(|source| ReconcileError::EngineBindFailure {
            job: job_name,
            source,
        })?;
    job.clear_source();
    Ok(())
}

/// Install `binding` as the job's sole script source.
///
/// The engine is told first; the job's provider is only swapped once the
/// engine accepted it, so a rejected bind leaves the previous provider intact.
pub(crate) async fn apply_binding(
    engine: &dyn ExecutionEngine,
    job: &Job,
    binding: &ScriptBinding,
    attributes: &ProjectAttributes,
) -> ReconcileResult<Arc<ScriptSource>> {
    let job_name = job.full_name();
    engine
        .bind_source(&job_name, binding, attributes)
        .await
        .map_err(|source| ReconcileError::EngineBindFailure {
            job: job_name,
            source,
        })?;

    let source = Arc::new(ScriptSource::new(binding.clone()));
    job.install_source(source.clone());
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryExecutionEngine;

    #[tokio::test]
    async fn test_apply_binding_replaces_source() {
        let engine = MemoryExecutionEngine::new();
        let job = Job::new("repo", "main", JobKind::Pipeline);
        assert!(!job.is_bound());

        let first = ScriptBinding::new(Some("a.groovy"), false);
        let second = ScriptBinding::new(Some("b.groovy"), true);
        let attrs = ProjectAttributes::default();

        apply_binding(&engine, &job, &first, &attrs).await.unwrap();
        let held = job.script_source().unwrap();
        apply_binding(&engine, &job, &second, &attrs).await.unwrap();

        // A reader holding the old provider keeps a consistent view.
        assert_eq!(held.binding, first);
        assert_eq!(job.binding(), Some(second.clone()));
        assert_eq!(engine.binding_for("repo/main"), Some(second));
    }

    #[tokio::test]
    async fn test_rejected_bind_keeps_previous_source() {
        let engine = MemoryExecutionEngine::new();
        let job = Job::new("repo", "main", JobKind::Pipeline);
        let attrs = ProjectAttributes::default();
        let first = ScriptBinding::default();
        apply_binding(&engine, &job, &first, &attrs).await.unwrap();

        engine.reject("repo/main");
        let err = apply_binding(&engine, &job, &ScriptBinding::new(Some("x"), true), &attrs)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::EngineBindFailure { .. }));
        assert_eq!(job.binding(), Some(first));
    }

    #[tokio::test]
    async fn test_clear_binding_unbinds_engine_and_job() {
        let engine = MemoryExecutionEngine::new();
        let job = Job::new("repo", "main", JobKind::Pipeline);
        let attrs = ProjectAttributes::default();

        clear_binding(&engine, &job).await.unwrap();
        assert!(!job.is_bound());

        apply_binding(&engine, &job, &ScriptBinding::default(), &attrs)
            .await
            .unwrap();
        clear_binding(&engine, &job).await.unwrap();

        assert_eq!(job.binding(), None);
        assert_eq!(engine.binding_for("repo/main"), None);
    }

    #[test]
    fn test_status_transitions() {
        let job = Job::new("repo", "feature", JobKind::Pipeline);
        assert_eq!(job.record_miss(), 1);
        assert_eq!(job.record_miss(), 2);
        job.disable();
        assert!(job.is_disabled());

        assert!(job.mark_materialized(7));
        assert!(!job.is_disabled());
        assert_eq!(job.missed_passes(), 0);
        assert_eq!(job.last_materialized_at(), 7);
        assert!(!job.mark_materialized(8));
    }

    #[test]
    fn test_snapshot_restores_status() {
        let job = Job::new("repo", "feature", JobKind::Pipeline);
        job.mark_materialized(3);
        job.record_miss();

        let restored = Job::from_snapshot("repo", job.snapshot());
        assert_eq!(restored.branch_name(), "feature");
        assert_eq!(restored.last_materialized_at(), 3);
        assert_eq!(restored.missed_passes(), 1);
        assert!(!restored.is_bound());
    }

    #[test]
    fn test_attributes_skip_empty_fields() {
        let json = serde_json::to_value(ProjectAttributes::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
