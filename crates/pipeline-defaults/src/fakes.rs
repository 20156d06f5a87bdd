//! In-memory fakes for the external collaborators (testing only)
//!
//! Provides `MemoryExecutionEngine`, `StaticScanner`, `StaticProbe`, and
//! `StaticCaller`, which satisfy the collaborator traits without any host.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::actions::{Caller, Permission};
use crate::binding::ScriptBinding;
use crate::engine::{EngineError, ExecutionEngine};
use crate::error::{ReconcileError, ReconcileResult};
use crate::job::ProjectAttributes;
use crate::scan::{BranchDescriptor, BranchScanner, Probe};

// ---------------------------------------------------------------------------
// MemoryExecutionEngine
// ---------------------------------------------------------------------------

/// Execution engine that records the latest binding and attributes per job.
#[derive(Debug, Default)]
pub struct MemoryExecutionEngine {
    bindings: Mutex<BTreeMap<String, ScriptBinding>>,
    attributes: Mutex<BTreeMap<String, ProjectAttributes>>,
    bind_counts: Mutex<BTreeMap<String, usize>>,
    rejected: Mutex<HashSet<String>>,
}

impl MemoryExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every future bind for `job`.
    pub fn reject(&self, job: &str) {
        self.rejected.lock().unwrap().insert(job.to_string());
    }

    /// Accept binds for `job` again.
    pub fn accept(&self, job: &str) {
        self.rejected.lock().unwrap().remove(job);
    }

    pub fn binding_for(&self, job: &str) -> Option<ScriptBinding> {
        self.bindings.lock().unwrap().get(job).cloned()
    }

    /// Attributes passed with the last accepted bind of `job`.
    pub fn attributes_for(&self, job: &str) -> Option<ProjectAttributes> {
        self.attributes.lock().unwrap().get(job).cloned()
    }

    /// Number of accepted binds for `job`.
    pub fn bind_count(&self, job: &str) -> usize {
        self.bind_counts
            .lock()
            .unwrap()
            .get(job)
            .copied()
            .unwrap_or(0)
    }

    pub fn bound_jobs(&self) -> Vec<String> {
        self.bindings.lock().unwrap().keys().cloned().collect()
    }

    fn check_accepted(&self, job: &str) -> Result<(), EngineError> {
        if self.rejected.lock().unwrap().contains(job) {
            return Err(EngineError::Rejected {
                job: job.to_string(),
                reason: "bind rejected by test engine".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionEngine for MemoryExecutionEngine {
    async fn bind_source(
        &self,
        job: &str,
        binding: &ScriptBinding,
        attributes: &ProjectAttributes,
    ) -> Result<(), EngineError> {
        self.check_accepted(job)?;
        self.bindings
            .lock()
            .unwrap()
            .insert(job.to_string(), binding.clone());
        self.attributes
            .lock()
            .unwrap()
            .insert(job.to_string(), attributes.clone());
        *self
            .bind_counts
            .lock()
            .unwrap()
            .entry(job.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn unbind_source(&self, job: &str) -> Result<(), EngineError> {
        self.check_accepted(job)?;
        self.bindings.lock().unwrap().remove(job);
        self.attributes.lock().unwrap().remove(job);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticProbe
// ---------------------------------------------------------------------------

/// Probe over a fixed file list. Counts how often it is queried.
#[derive(Debug, Default)]
pub struct StaticProbe {
    files: BTreeSet<String>,
    queries: AtomicUsize,
}

impl StaticProbe {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_files<'a>(files: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            files: files.into_iter().map(str::to_string).collect(),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

impl Probe for StaticProbe {
    fn exists(&self, path: &str) -> bool {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.files.contains(path)
    }
}

/// Descriptors for `names`, each with an empty probe.
pub fn branches(names: &[&str]) -> Vec<BranchDescriptor> {
    names
        .iter()
        .map(|name| BranchDescriptor::new(*name, Arc::new(StaticProbe::empty())))
        .collect()
}

// ---------------------------------------------------------------------------
// StaticScanner
// ---------------------------------------------------------------------------

/// Scanner returning a replaceable, fixed branch list.
#[derive(Debug, Default)]
pub struct StaticScanner {
    branches: Mutex<Vec<String>>,
    failing: Mutex<bool>,
}

impl StaticScanner {
    pub fn new(names: &[&str]) -> Self {
        let scanner = Self::default();
        scanner.set_branches(names);
        scanner
    }

    pub fn set_branches(&self, names: &[&str]) {
        *self.branches.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }

    /// Make the next scans fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl BranchScanner for StaticScanner {
    async fn scan(&self, container: &str) -> ReconcileResult<Vec<BranchDescriptor>> {
        if *self.failing.lock().unwrap() {
            return Err(ReconcileError::ScanFailed {
                container: container.to_string(),
                reason: "scan failure injected".to_string(),
            });
        }
        let names = self.branches.lock().unwrap().clone();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        Ok(branches(&refs))
    }
}

// ---------------------------------------------------------------------------
// StaticCaller
// ---------------------------------------------------------------------------

/// Caller holding a fixed permission set.
#[derive(Debug, Clone, Default)]
pub struct StaticCaller {
    permissions: HashSet<Permission>,
}

impl StaticCaller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with(permissions: &[Permission]) -> Self {
        Self {
            permissions: permissions.iter().copied().collect(),
        }
    }
}

impl Caller for StaticCaller {
    fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}
