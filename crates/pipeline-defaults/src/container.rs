//! Multi-branch containers: persisted configuration plus the live job set.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{ReconcileError, ReconcileResult};
use crate::extension::FactoryKind;
use crate::factory::ProjectFactory;
use crate::job::{Job, JobSnapshot};

/// Persisted per-container configuration.
///
/// Created with the container and changed only by administrator edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Factory kind that materializes this container's branches.
    #[serde(default)]
    pub factory_kind: FactoryKind,

    /// The container's script binding.
    #[serde(default)]
    pub factory: ProjectFactory,

    /// Overrides the driver's orphan grace period for this container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphan_grace_passes: Option<u32>,
}

impl ContainerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            factory_kind: FactoryKind::defaults(),
            factory: ProjectFactory::new(),
            orphan_grace_passes: None,
        }
    }

    pub fn with_factory(mut self, factory: ProjectFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_orphan_grace_passes(mut self, passes: u32) -> Self {
        self.orphan_grace_passes = Some(passes);
        self
    }
}

/// Job set guarded by the container's pass lock.
#[derive(Debug, Default)]
pub(crate) struct ContainerState {
    pub(crate) jobs: BTreeMap<String, Arc<Job>>,
    pub(crate) last_committed_pass: u64,
}

/// A grouping entity owning one job per qualifying branch.
///
/// Branch name is the primary key of the job set. The job set is only mutated
/// while holding the pass lock, which admits one reconciliation pass at a
/// time.
#[derive(Debug)]
pub struct MultiBranchContainer {
    name: String,
    config: RwLock<ContainerConfig>,
    pub(crate) state: Mutex<ContainerState>,
    scan_seq: AtomicU64,
}

impl MultiBranchContainer {
    pub fn new(config: ContainerConfig) -> Self {
        Self {
            name: config.name.clone(),
            config: RwLock::new(config),
            state: Mutex::new(ContainerState::default()),
            scan_seq: AtomicU64::new(0),
        }
    }

    /// Rebuild a container from persisted jobs. Pass numbering resumes after
    /// `last_pass`.
    pub fn restore(
        config: ContainerConfig,
        jobs: Vec<JobSnapshot>,
        last_pass: u64,
    ) -> ReconcileResult<Self> {
        let name = config.name.clone();
        let mut map = BTreeMap::new();
        for snapshot in jobs {
            let branch = snapshot.branch_name.clone();
            let job = Arc::new(Job::from_snapshot(name.clone(), snapshot));
            if map.insert(branch.clone(), job).is_some() {
                return Err(ReconcileError::DuplicateJob {
                    container: name,
                    branch,
                });
            }
        }
        Ok(Self {
            name,
            config: RwLock::new(config),
            state: Mutex::new(ContainerState {
                jobs: map,
                last_committed_pass: last_pass,
            }),
            scan_seq: AtomicU64::new(last_pass),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> ContainerConfig {
        self.config.read().unwrap().clone()
    }

    /// Snapshot of the factory configuration.
    pub fn factory(&self) -> ProjectFactory {
        self.config.read().unwrap().factory.clone()
    }

    pub fn set_script_id(&self, script_id: Option<&str>) {
        let mut config = self.config.write().unwrap();
        config.factory.set_script_id(script_id);
        info!(container = %self.name, script_id = %config.factory.script_id(), "script id updated");
    }

    pub fn script_id(&self) -> String {
        self.config.read().unwrap().factory.script_id().to_string()
    }

    pub fn set_use_sandbox(&self, use_sandbox: bool) {
        self.config.write().unwrap().factory.set_use_sandbox(use_sandbox);
        info!(container = %self.name, use_sandbox, "sandbox mode updated");
    }

    pub fn use_sandbox(&self) -> bool {
        self.config.read().unwrap().factory.use_sandbox()
    }

    pub fn is_kind_active(&self, kind: &FactoryKind) -> bool {
        self.config.read().unwrap().factory_kind == *kind
    }

    pub(crate) fn orphan_grace_override(&self) -> Option<u32> {
        self.config.read().unwrap().orphan_grace_passes
    }

    /// All jobs, ordered by branch name.
    pub async fn jobs(&self) -> Vec<Arc<Job>> {
        self.state.lock().await.jobs.values().cloned().collect()
    }

    pub async fn job(&self, branch: &str) -> Option<Arc<Job>> {
        self.state.lock().await.jobs.get(branch).cloned()
    }

    pub async fn job_names(&self) -> Vec<String> {
        self.state.lock().await.jobs.keys().cloned().collect()
    }

    pub async fn snapshots(&self) -> Vec<JobSnapshot> {
        self.state
            .lock()
            .await
            .jobs
            .values()
            .map(|job| job.snapshot())
            .collect()
    }

    /// Sequence number of the last pass that committed.
    pub async fn last_committed_pass(&self) -> u64 {
        self.state.lock().await.last_committed_pass
    }

    /// Add a job created outside the driver. Fails if the branch already has one.
    pub async fn adopt_job(&self, job: Job) -> ReconcileResult<Arc<Job>> {
        let mut state = self.state.lock().await;
        let branch = job.branch_name().to_string();
        if state.jobs.contains_key(&branch) {
            return Err(ReconcileError::DuplicateJob {
                container: self.name.clone(),
                branch,
            });
        }
        let job = Arc::new(job);
        state.jobs.insert(branch, job.clone());
        Ok(job)
    }

    /// Delete one job explicitly.
    pub async fn prune(&self, branch: &str) -> ReconcileResult<Arc<Job>> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .remove(branch)
            .ok_or_else(|| ReconcileError::JobNotFound {
                container: self.name.clone(),
                branch: branch.to_string(),
            })?;
        info!(container = %self.name, branch = %branch, "job pruned");
        Ok(job)
    }

    /// Delete every disabled job, returning their branch names.
    pub async fn prune_disabled(&self) -> Vec<String> {
        let mut state = self.state.lock().await;
        let disabled: Vec<String> = state
            .jobs
            .iter()
            .filter(|(_, job)| job.is_disabled())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &disabled {
            state.jobs.remove(name);
        }
        if !disabled.is_empty() {
            info!(container = %self.name, pruned = disabled.len(), "disabled jobs pruned");
        }
        disabled
    }

    /// Take a sequence number for a newly triggered scan.
    pub(crate) fn begin_scan(&self) -> u64 {
        self.scan_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Sequence number of the most recently triggered scan.
    pub fn latest_scan(&self) -> u64 {
        self.scan_seq.load(Ordering::SeqCst)
    }

    pub(crate) fn is_superseded(&self, pass: u64) -> bool {
        self.latest_scan() > pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;
    use crate::DEFAULT_SCRIPT_ID;

    #[test]
    fn test_admin_surface_defaults() {
        let container = MultiBranchContainer::new(ContainerConfig::new("org/repo"));
        assert_eq!(container.script_id(), DEFAULT_SCRIPT_ID);
        assert!(!container.use_sandbox());
        assert!(container.is_kind_active(&FactoryKind::defaults()));
    }

    #[test]
    fn test_admin_surface_roundtrip() {
        let container = MultiBranchContainer::new(ContainerConfig::new("org/repo"));
        container.set_script_id(Some("shared-lib.groovy"));
        container.set_use_sandbox(true);
        assert_eq!(container.script_id(), "shared-lib.groovy");
        assert!(container.use_sandbox());

        container.set_script_id(Some(""));
        assert_eq!(container.script_id(), DEFAULT_SCRIPT_ID);
        assert_eq!(container.config().factory.script_id(), DEFAULT_SCRIPT_ID);
    }

    #[test]
    fn test_config_json_defaults() {
        let config: ContainerConfig = serde_json::from_str(r#"{"name":"org/repo"}"#).unwrap();
        assert_eq!(config, ContainerConfig::new("org/repo"));

        let config: ContainerConfig = serde_json::from_str(
            r#"{"name":"r","factory":{"script_id":"","use_sandbox":true},"orphan_grace_passes":4}"#,
        )
        .unwrap();
        assert_eq!(config.factory.script_id(), DEFAULT_SCRIPT_ID);
        assert!(config.factory.use_sandbox());
        assert_eq!(config.orphan_grace_passes, Some(4));
    }

    #[test]
    fn test_scan_sequence() {
        let container = MultiBranchContainer::new(ContainerConfig::new("r"));
        let first = container.begin_scan();
        assert!(!container.is_superseded(first));
        let second = container.begin_scan();
        assert!(container.is_superseded(first));
        assert!(!container.is_superseded(second));
    }

    #[tokio::test]
    async fn test_adopt_rejects_duplicate_branch() {
        let container = MultiBranchContainer::new(ContainerConfig::new("r"));
        container
            .adopt_job(Job::new("r", "main", JobKind::Pipeline))
            .await
            .unwrap();
        let err = container
            .adopt_job(Job::new("r", "main", JobKind::Pipeline))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::DuplicateJob { .. }));
        assert_eq!(container.job_names().await, vec!["main"]);
    }

    #[tokio::test]
    async fn test_restore_resumes_numbering() {
        let job = Job::new("r", "main", JobKind::Pipeline);
        let container =
            MultiBranchContainer::restore(ContainerConfig::new("r"), vec![job.snapshot()], 9)
                .unwrap();
        assert_eq!(container.latest_scan(), 9);
        assert_eq!(container.begin_scan(), 10);
        assert_eq!(container.last_committed_pass().await, 9);
        assert!(container.job("main").await.is_some());
    }

    #[tokio::test]
    async fn test_restore_rejects_duplicates() {
        let job = Job::new("r", "main", JobKind::Pipeline);
        let err = MultiBranchContainer::restore(
            ContainerConfig::new("r"),
            vec![job.snapshot(), job.snapshot()],
            0,
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::DuplicateJob { .. }));
    }

    #[tokio::test]
    async fn test_prune_missing_job() {
        let container = MultiBranchContainer::new(ContainerConfig::new("r"));
        let err = container.prune("gone").await.unwrap_err();
        assert!(matches!(err, ReconcileError::JobNotFound { .. }));
    }
}
