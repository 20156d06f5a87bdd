//! Global atomic counters for reconciliation.
//!
//! Counters are bumped silently by the driver. Call [`Metrics::flush`] to emit
//! the current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free reconciliation counters.
pub struct Metrics {
    passes_committed: AtomicU64,
    passes_superseded: AtomicU64,
    jobs_created: AtomicU64,
    jobs_updated: AtomicU64,
    jobs_disabled: AtomicU64,
    branch_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            passes_committed: AtomicU64::new(0),
            passes_superseded: AtomicU64::new(0),
            jobs_created: AtomicU64::new(0),
            jobs_updated: AtomicU64::new(0),
            jobs_disabled: AtomicU64::new(0),
            branch_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_passes_committed(&self) {
        self.passes_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_passes_superseded(&self) {
        self.passes_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_jobs_created(&self, n: u64) {
        self.jobs_created.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_jobs_updated(&self, n: u64) {
        self.jobs_updated.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_jobs_disabled(&self, n: u64) {
        self.jobs_disabled.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_branch_failures(&self, n: u64) {
        self.branch_failures.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call at natural boundaries (end of a CLI run, daemon tick).
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            passes_committed = self.passes_committed(),
            passes_superseded = self.passes_superseded(),
            jobs_created = self.jobs_created(),
            jobs_updated = self.jobs_updated(),
            jobs_disabled = self.jobs_disabled(),
            branch_failures = self.branch_failures(),
        );
    }

    pub fn passes_committed(&self) -> u64 {
        self.passes_committed.load(Ordering::Relaxed)
    }

    pub fn passes_superseded(&self) -> u64 {
        self.passes_superseded.load(Ordering::Relaxed)
    }

    pub fn jobs_created(&self) -> u64 {
        self.jobs_created.load(Ordering::Relaxed)
    }

    pub fn jobs_updated(&self) -> u64 {
        self.jobs_updated.load(Ordering::Relaxed)
    }

    pub fn jobs_disabled(&self) -> u64 {
        self.jobs_disabled.load(Ordering::Relaxed)
    }

    pub fn branch_failures(&self) -> u64 {
        self.branch_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Uses a local instance; the global one is shared with concurrently
    // running driver tests.
    #[test]
    fn test_counters_accumulate() {
        let m = Metrics::new();
        m.inc_passes_committed();
        m.inc_passes_committed();
        m.inc_passes_superseded();
        m.add_jobs_created(3);
        m.add_jobs_updated(2);
        m.add_jobs_disabled(1);
        m.add_branch_failures(4);

        assert_eq!(m.passes_committed(), 2);
        assert_eq!(m.passes_superseded(), 1);
        assert_eq!(m.jobs_created(), 3);
        assert_eq!(m.jobs_updated(), 2);
        assert_eq!(m.jobs_disabled(), 1);
        assert_eq!(m.branch_failures(), 4);
        m.flush();
    }
}
