//! Reconciliation of a container's job set against a branch scan.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use pipeline_registry::ScriptRegistry;
use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};

use crate::binding::ScriptBinding;
use crate::config::DriverConfig;
use crate::container::{ContainerState, MultiBranchContainer};
use crate::engine::ExecutionEngine;
use crate::error::{ReconcileError, ReconcileResult};
use crate::factory::ProjectFactory;
use crate::job::{clear_binding, Job, JobKind};
use crate::metrics::METRICS;
use crate::obs::{
    emit_branch_failed, emit_pass_finished, emit_pass_started, emit_pass_superseded, pass_span,
};
use crate::policy::BranchCriteria;
use crate::scan::{BranchDescriptor, BranchScanner};

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassOutcome {
    /// Changes were applied to the job set.
    Committed,
    /// A newer scan was triggered first; nothing was applied.
    Superseded { latest: u64 },
}

/// Category of a per-branch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RegistryLookup,
    InvalidConfiguration,
    EngineBind,
    Other,
}

impl FailureKind {
    pub fn of(error: &ReconcileError) -> Self {
        match error {
            ReconcileError::RegistryLookupFailure { .. } => FailureKind::RegistryLookup,
            ReconcileError::InvalidConfiguration { .. } => FailureKind::InvalidConfiguration,
            ReconcileError::EngineBindFailure { .. } => FailureKind::EngineBind,
            _ => FailureKind::Other,
        }
    }
}

/// A failure recorded against one branch during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFailure {
    pub branch: String,
    pub kind: FailureKind,
    pub message: String,
}

impl BranchFailure {
    fn from_error(branch: &str, error: &ReconcileError) -> Self {
        Self {
            branch: branch.to_string(),
            kind: FailureKind::of(error),
            message: error.to_string(),
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub container: String,
    pub pass: u64,
    pub outcome: PassOutcome,
    /// Branches whose job got its first binding: new jobs, and jobs left
    /// unbound by an earlier failed pass.
    pub created: Vec<String>,
    /// Branches whose already bound job was rebound.
    pub updated: Vec<String>,
    /// Previously disabled jobs whose branch came back.
    pub reenabled: Vec<String>,
    /// Branches that did not qualify or whose job is not a pipeline job.
    pub skipped: Vec<String>,
    /// Jobs missed this pass but still inside their grace period.
    pub orphaned: Vec<String>,
    /// Jobs disabled this pass.
    pub disabled: Vec<String>,
    pub failures: Vec<BranchFailure>,
    pub duration_ms: u64,
}

impl PassReport {
    fn new(container: &str, pass: u64) -> Self {
        Self {
            container: container.to_string(),
            pass,
            outcome: PassOutcome::Committed,
            created: Vec::new(),
            updated: Vec::new(),
            reenabled: Vec::new(),
            skipped: Vec::new(),
            orphaned: Vec::new(),
            disabled: Vec::new(),
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.outcome == PassOutcome::Committed
    }

    /// Committed with no per-branch failures.
    pub fn is_clean(&self) -> bool {
        self.is_committed() && self.failures.is_empty()
    }

    pub fn failure_for(&self, branch: &str) -> Option<&BranchFailure> {
        self.failures.iter().find(|f| f.branch == branch)
    }
}

struct PlannedBranch {
    branch: BranchDescriptor,
    existing: Option<Arc<Job>>,
    resolution: ReconcileResult<()>,
}

/// Drives reconciliation passes over multi-branch containers.
///
/// A pass runs in two phases under the container's pass lock:
/// 1. Plan: qualify each branch and resolve its script. No mutation.
/// 2. Commit: create or rebind jobs, then age out jobs whose branch vanished.
///
/// A pass whose scan number has been overtaken by a newer trigger before the
/// commit phase is discarded, so the job set always reflects the latest scan.
pub struct ReconciliationDriver {
    registry: Arc<dyn ScriptRegistry>,
    engine: Arc<dyn ExecutionEngine>,
    config: DriverConfig,
}

impl ReconciliationDriver {
    pub fn new(registry: Arc<dyn ScriptRegistry>, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            registry,
            engine,
            config: DriverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Run one pass over `branches`.
    ///
    /// Waits for any pass already running on the container. If another scan is
    /// triggered while this one waits or plans, this pass is discarded in its
    /// favour and reported as [`PassOutcome::Superseded`].
    pub async fn reconcile(
        &self,
        container: &MultiBranchContainer,
        branches: Vec<BranchDescriptor>,
    ) -> PassReport {
        let pass = container.begin_scan();
        let mut state = match container.state.try_lock() {
            Ok(state) => state,
            Err(_) => {
                debug!(container = %container.name(), pass, "pass queued behind active pass");
                container.state.lock().await
            }
        };
        self.run_pass(container, &mut state, pass, branches)
            .instrument(pass_span(container.name(), pass))
            .await
    }

    /// Like [`Self::reconcile`], but fails with
    /// [`ReconcileError::ConcurrentPassConflict`] instead of waiting.
    pub async fn try_reconcile(
        &self,
        container: &MultiBranchContainer,
        branches: Vec<BranchDescriptor>,
    ) -> ReconcileResult<PassReport> {
        let mut state =
            container
                .state
                .try_lock()
                .map_err(|_| ReconcileError::ConcurrentPassConflict {
                    container: container.name().to_string(),
                })?;
        let pass = container.begin_scan();
        Ok(self
            .run_pass(container, &mut state, pass, branches)
            .instrument(pass_span(container.name(), pass))
            .await)
    }

    /// Scan the container, then reconcile against the result.
    pub async fn scan_and_reconcile(
        &self,
        container: &MultiBranchContainer,
        scanner: &dyn BranchScanner,
    ) -> ReconcileResult<PassReport> {
        let branches = scanner.scan(container.name()).await?;
        Ok(self.reconcile(container, branches).await)
    }

    async fn run_pass(
        &self,
        container: &MultiBranchContainer,
        state: &mut ContainerState,
        pass: u64,
        branches: Vec<BranchDescriptor>,
    ) -> PassReport {
        let start = Instant::now();
        let mut report = PassReport::new(container.name(), pass);

        if container.is_superseded(pass) {
            return discard(container, report);
        }
        emit_pass_started(container.name(), pass, branches.len());

        // The binding is fixed for the whole pass.
        let factory = container.factory();
        let binding = factory.binding();
        let criteria = factory.criteria();

        let mut planned = Vec::with_capacity(branches.len());
        let mut seen = HashSet::new();
        let mut matched = HashSet::with_capacity(branches.len());
        for branch in branches {
            if !seen.insert(branch.name.clone()) {
                debug!(branch = %branch.name, "duplicate branch in scan ignored");
                continue;
            }
            if !criteria.is_head(branch.probe.as_ref()) {
                report.skipped.push(branch.name);
                continue;
            }
            let existing = state.jobs.get(&branch.name).cloned();
            if let Some(job) = existing.as_ref().filter(|j| *j.kind() != JobKind::Pipeline) {
                debug!(
                    branch = %branch.name,
                    kind = ?job.kind(),
                    "incompatible job left untouched"
                );
                matched.insert(branch.name.clone());
                report.skipped.push(branch.name);
                continue;
            }
            let resolution = self.resolve(&branch.name, &binding).await;
            if container.is_superseded(pass) {
                return discard(container, report);
            }
            planned.push(PlannedBranch {
                branch,
                existing,
                resolution,
            });
        }
        if container.is_superseded(pass) {
            return discard(container, report);
        }

        for PlannedBranch {
            branch,
            existing,
            resolution,
        } in planned
        {
            matched.insert(branch.name.clone());
            let result = match resolution {
                Ok(()) => {
                    self.materialize(
                        &factory,
                        container,
                        state,
                        &branch,
                        existing.as_ref(),
                        pass,
                        &mut report,
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            if let Err(err) = result {
                let job = existing.unwrap_or_else(|| {
                    let job = Arc::new(Job::new(container.name(), &branch.name, JobKind::Pipeline));
                    state.jobs.insert(branch.name.clone(), job.clone());
                    job
                });
                // A binding the current configuration may not use is dropped.
                if matches!(err, ReconcileError::InvalidConfiguration { .. }) {
                    if let Err(unbind) = clear_binding(self.engine.as_ref(), &job).await {
                        emit_branch_failed(container.name(), &branch.name, &unbind);
                    }
                }
                job.record_failure(&err);
                emit_branch_failed(container.name(), &branch.name, &err);
                report.failures.push(BranchFailure::from_error(&branch.name, &err));
            }
        }

        let grace = container
            .orphan_grace_override()
            .unwrap_or(self.config.orphan_grace_passes);
        for (name, job) in &state.jobs {
            if matched.contains(name) {
                continue;
            }
            let missed = job.record_miss();
            if job.is_disabled() {
                continue;
            }
            if missed >= grace {
                job.disable();
                report.disabled.push(name.clone());
            } else {
                report.orphaned.push(name.clone());
            }
        }

        state.last_committed_pass = pass;
        report.duration_ms = start.elapsed().as_millis() as u64;

        METRICS.inc_passes_committed();
        METRICS.add_jobs_created(report.created.len() as u64);
        METRICS.add_jobs_updated(report.updated.len() as u64);
        METRICS.add_jobs_disabled(report.disabled.len() as u64);
        METRICS.add_branch_failures(report.failures.len() as u64);
        emit_pass_finished(
            container.name(),
            pass,
            report.created.len(),
            report.updated.len(),
            report.disabled.len(),
            report.failures.len(),
            report.duration_ms,
        );
        report
    }

    /// Check that the binding's script can be used for `branch`.
    async fn resolve(&self, branch: &str, binding: &ScriptBinding) -> ReconcileResult<()> {
        let entry = self
            .registry
            .lookup(binding.script_id())
            .await
            .map_err(|e| ReconcileError::RegistryLookupFailure {
                branch: branch.to_string(),
                script_id: binding.script_id().to_string(),
                reason: e.to_string(),
            })?;
        if !entry.readable_by(binding.use_sandbox()) {
            return Err(ReconcileError::InvalidConfiguration {
                branch: branch.to_string(),
                reason: format!(
                    "script {} is restricted to trusted execution but the binding is sandboxed",
                    entry.script_id
                ),
            });
        }
        debug!(
            branch = %branch,
            script_id = %entry.script_id,
            digest = %entry.digest().short(),
            "script resolved"
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn materialize(
        &self,
        factory: &ProjectFactory,
        container: &MultiBranchContainer,
        state: &mut ContainerState,
        branch: &BranchDescriptor,
        existing: Option<&Arc<Job>>,
        pass: u64,
        report: &mut PassReport,
    ) -> ReconcileResult<()> {
        match existing {
            None => {
                let job = factory
                    .create_project(
                        self.engine.as_ref(),
                        container.name(),
                        &branch.name,
                        &branch.attributes,
                    )
                    .await?;
                job.mark_materialized(pass);
                state.jobs.insert(branch.name.clone(), Arc::new(job));
                report.created.push(branch.name.clone());
            }
            Some(job) => {
                let was_bound = job.is_bound();
                let rebound = factory
                    .update_existing_project(self.engine.as_ref(), job, &branch.attributes)
                    .await?;
                if !rebound {
                    report.skipped.push(branch.name.clone());
                    return Ok(());
                }
                if job.mark_materialized(pass) {
                    report.reenabled.push(branch.name.clone());
                }
                if was_bound {
                    report.updated.push(branch.name.clone());
                } else {
                    report.created.push(branch.name.clone());
                }
            }
        }
        Ok(())
    }
}

fn discard(container: &MultiBranchContainer, mut report: PassReport) -> PassReport {
    let latest = container.latest_scan();
    emit_pass_superseded(container.name(), report.pass, latest);
    METRICS.inc_passes_superseded();
    report.outcome = PassOutcome::Superseded { latest };
    report.skipped.clear();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerConfig;
    use crate::fakes::{branches, MemoryExecutionEngine};
    use pipeline_registry::fakes::MemoryScriptRegistry;
    use pipeline_registry::ScriptEntry;

    fn driver_with(
        registry: MemoryScriptRegistry,
    ) -> (ReconciliationDriver, Arc<MemoryExecutionEngine>) {
        let engine = Arc::new(MemoryExecutionEngine::new());
        let driver = ReconciliationDriver::new(Arc::new(registry), engine.clone());
        (driver, engine)
    }

    fn default_registry() -> MemoryScriptRegistry {
        MemoryScriptRegistry::with_scripts([("Jenkinsfile", "pipeline { agent any }")])
    }

    #[tokio::test]
    async fn test_first_pass_creates_jobs() {
        let (driver, engine) = driver_with(default_registry());
        let container = MultiBranchContainer::new(ContainerConfig::new("repo"));

        let report = driver.reconcile(&container, branches(&["main", "dev"])).await;

        assert!(report.is_clean());
        assert_eq!(report.pass, 1);
        assert_eq!(report.created, vec!["main", "dev"]);
        assert_eq!(engine.bound_jobs(), vec!["repo/dev", "repo/main"]);
        assert_eq!(container.last_committed_pass().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_names_in_scan_yield_one_job() {
        let (driver, engine) = driver_with(default_registry());
        let container = MultiBranchContainer::new(ContainerConfig::new("repo"));

        let report = driver
            .reconcile(&container, branches(&["main", "main", "main"]))
            .await;

        assert_eq!(report.created, vec!["main"]);
        assert_eq!(container.job_names().await, vec!["main"]);
        assert_eq!(engine.bind_count("repo/main"), 1);
    }

    #[tokio::test]
    async fn test_missing_script_leaves_job_unbound() {
        let (driver, engine) = driver_with(MemoryScriptRegistry::new());
        let container = MultiBranchContainer::new(ContainerConfig::new("repo"));

        let report = driver.reconcile(&container, branches(&["main"])).await;

        assert!(report.is_committed());
        assert!(!report.is_clean());
        let failure = report.failure_for("main").unwrap();
        assert_eq!(failure.kind, FailureKind::RegistryLookup);

        let job = container.job("main").await.unwrap();
        assert!(!job.is_bound());
        assert!(job.last_error().unwrap().contains("Jenkinsfile"));
        assert!(engine.bound_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_sandboxed_binding_to_trusted_script_is_invalid() {
        let registry = MemoryScriptRegistry::new();
        registry.insert(ScriptEntry::new("release.groovy", "node { }").trusted_only());
        let (driver, _engine) = driver_with(registry);
        let mut factory = ProjectFactory::new();
        factory.set_script_id(Some("release.groovy"));
        factory.set_use_sandbox(true);
        let container =
            MultiBranchContainer::new(ContainerConfig::new("repo").with_factory(factory));

        let report = driver.reconcile(&container, branches(&["main"])).await;

        let failure = report.failure_for("main").unwrap();
        assert_eq!(failure.kind, FailureKind::InvalidConfiguration);
        assert!(!container.job("main").await.unwrap().is_bound());

        // Trusted mode may read it. The job's first binding counts as a creation.
        container.set_use_sandbox(false);
        let report = driver.reconcile(&container, branches(&["main"])).await;
        assert!(report.is_clean());
        assert_eq!(report.created, vec!["main"]);
        assert!(report.updated.is_empty());
        assert!(container.job("main").await.unwrap().is_bound());
    }

    #[tokio::test]
    async fn test_switch_to_sandbox_unbinds_trusted_only_script() {
        let registry = MemoryScriptRegistry::new();
        registry.insert(ScriptEntry::new("release.groovy", "node { }").trusted_only());
        let (driver, engine) = driver_with(registry);
        let mut factory = ProjectFactory::new();
        factory.set_script_id(Some("release.groovy"));
        let container =
            MultiBranchContainer::new(ContainerConfig::new("repo").with_factory(factory));

        let report = driver.reconcile(&container, branches(&["main"])).await;
        assert!(report.is_clean());
        assert!(container.job("main").await.unwrap().is_bound());

        container.set_use_sandbox(true);
        let report = driver.reconcile(&container, branches(&["main"])).await;

        assert_eq!(
            report.failure_for("main").unwrap().kind,
            FailureKind::InvalidConfiguration
        );
        let job = container.job("main").await.unwrap();
        assert_eq!(job.binding(), None);
        assert!(job.last_error().is_some());
        assert_eq!(engine.binding_for("repo/main"), None);
    }

    #[tokio::test]
    async fn test_incompatible_job_untouched_when_lookup_fails() {
        let (driver, engine) = driver_with(MemoryScriptRegistry::new());
        let container = MultiBranchContainer::new(ContainerConfig::new("repo"));
        container
            .adopt_job(Job::new("repo", "legacy", JobKind::Other("freestyle".into())))
            .await
            .unwrap();

        let report = driver.reconcile(&container, branches(&["legacy"])).await;

        assert_eq!(report.skipped, vec!["legacy"]);
        assert!(report.failures.is_empty());
        let legacy = container.job("legacy").await.unwrap();
        assert!(legacy.last_error().is_none());
        assert_eq!(legacy.missed_passes(), 0);
        assert_eq!(engine.bind_count("repo/legacy"), 0);
    }

    #[tokio::test]
    async fn test_first_successful_bind_reported_as_created() {
        let registry = MemoryScriptRegistry::new();
        let registry = Arc::new(registry);
        let engine = Arc::new(MemoryExecutionEngine::new());
        let driver = ReconciliationDriver::new(registry.clone(), engine.clone());
        let container = MultiBranchContainer::new(ContainerConfig::new("repo"));

        let report = driver.reconcile(&container, branches(&["main"])).await;
        assert!(report.created.is_empty());
        assert_eq!(report.failures.len(), 1);

        registry.insert(ScriptEntry::new("Jenkinsfile", "pipeline { }"));
        let report = driver.reconcile(&container, branches(&["main"])).await;
        assert_eq!(report.created, vec!["main"]);
        assert!(report.updated.is_empty());

        let report = driver.reconcile(&container, branches(&["main"])).await;
        assert!(report.created.is_empty());
        assert_eq!(report.updated, vec!["main"]);
    }

    #[tokio::test]
    async fn test_engine_rejection_is_isolated() {
        let (driver, engine) = driver_with(default_registry());
        engine.reject("repo/b");
        let container = MultiBranchContainer::new(ContainerConfig::new("repo"));

        let report = driver.reconcile(&container, branches(&["a", "b", "c"])).await;

        assert_eq!(report.created, vec!["a", "c"]);
        assert_eq!(report.failure_for("b").unwrap().kind, FailureKind::EngineBind);
        assert_eq!(container.job_names().await, vec!["a", "b", "c"]);
        assert!(!container.job("b").await.unwrap().is_bound());
    }

    #[tokio::test]
    async fn test_incompatible_job_is_skipped_not_orphaned() {
        let (driver, engine) = driver_with(default_registry());
        let container = MultiBranchContainer::new(ContainerConfig::new("repo"));
        container
            .adopt_job(Job::new("repo", "legacy", JobKind::Other("freestyle".into())))
            .await
            .unwrap();

        for _ in 0..3 {
            let report = driver.reconcile(&container, branches(&["legacy"])).await;
            assert_eq!(report.skipped, vec!["legacy"]);
            assert!(report.disabled.is_empty());
        }
        assert_eq!(engine.bind_count("repo/legacy"), 0);
        assert!(!container.job("legacy").await.unwrap().is_disabled());
    }

    #[tokio::test]
    async fn test_try_reconcile_conflicts_while_locked() {
        let (driver, _engine) = driver_with(default_registry());
        let container = MultiBranchContainer::new(ContainerConfig::new("repo"));

        let guard = container.state.lock().await;
        let err = driver
            .try_reconcile(&container, branches(&["main"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::ConcurrentPassConflict { .. }));
        // A rejected attempt does not consume a scan number.
        assert_eq!(container.latest_scan(), 0);
        drop(guard);

        let report = driver
            .try_reconcile(&container, branches(&["main"]))
            .await
            .unwrap();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_zero_grace_disables_on_first_miss() {
        let (driver, _engine) = driver_with(default_registry());
        let container =
            MultiBranchContainer::new(ContainerConfig::new("repo").with_orphan_grace_passes(0));

        driver.reconcile(&container, branches(&["main", "tmp"])).await;
        let report = driver.reconcile(&container, branches(&["main"])).await;

        assert_eq!(report.disabled, vec!["tmp"]);
        assert!(container.job("tmp").await.unwrap().is_disabled());
    }

    #[test]
    fn test_report_serializes_outcome_tag() {
        let mut report = PassReport::new("repo", 3);
        report.outcome = PassOutcome::Superseded { latest: 4 };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["status"], "superseded");
        assert_eq!(json["outcome"]["latest"], 4);
    }
}
