//! Scan results handed to the driver by the source-control subsystem.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ReconcileResult;
use crate::job::ProjectAttributes;

/// Opaque view into a branch's tree, produced by the scanner.
///
/// Criteria may ask whether a path exists; the default criteria never do.
pub trait Probe: Send + Sync + fmt::Debug {
    /// Whether `path` exists at the branch head.
    fn exists(&self, path: &str) -> bool;
}

/// One branch discovered by a scan. Consumed by a single pass, never persisted.
#[derive(Debug, Clone)]
pub struct BranchDescriptor {
    pub name: String,
    pub probe: Arc<dyn Probe>,
    pub attributes: ProjectAttributes,
}

impl BranchDescriptor {
    pub fn new(name: impl Into<String>, probe: Arc<dyn Probe>) -> Self {
        Self {
            name: name.into(),
            probe,
            attributes: ProjectAttributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: ProjectAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// External source-control scanner.
///
/// Each call yields a finite, ordered branch list for one container. Scans are
/// not restartable mid-way; a failed scan triggers no pass.
#[async_trait]
pub trait BranchScanner: Send + Sync {
    async fn scan(&self, container: &str) -> ReconcileResult<Vec<BranchDescriptor>>;
}
