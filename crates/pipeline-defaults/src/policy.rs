//! Branch qualification criteria.
//!
//! A criteria decides whether a scanned branch becomes a job. Criteria values
//! are compared by kind tag only, so the host's scan cache sees the same
//! criteria on every pass and does not trigger a full rescan.

use std::fmt;

use crate::scan::Probe;

/// Stable tag identifying a criteria implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CriteriaKind(&'static str);

impl CriteriaKind {
    pub const fn new(tag: &'static str) -> Self {
        Self(tag)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for CriteriaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Decides which scanned branches are heads worth building.
pub trait BranchCriteria: Send + Sync + fmt::Debug {
    fn kind(&self) -> CriteriaKind;

    fn is_head(&self, probe: &dyn Probe) -> bool;
}

/// Two criteria are interchangeable when their kinds match.
pub fn same_criteria(a: &dyn BranchCriteria, b: &dyn BranchCriteria) -> bool {
    a.kind() == b.kind()
}

/// Criteria for branches that build from the registry default script.
///
/// Every branch qualifies; the probe is never consulted. This is what sets the
/// defaults factory apart from one that requires a pipeline file in the
/// repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DefaultResolutionPolicy;

impl DefaultResolutionPolicy {
    pub const KIND: CriteriaKind = CriteriaKind::new("default-script");

    pub fn is_qualifying(&self, _probe: &dyn Probe) -> bool {
        true
    }
}

impl BranchCriteria for DefaultResolutionPolicy {
    fn kind(&self) -> CriteriaKind {
        Self::KIND
    }

    fn is_head(&self, probe: &dyn Probe) -> bool {
        self.is_qualifying(probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::StaticProbe;
    use std::collections::HashSet;

    #[derive(Debug)]
    struct RequiresFile;

    impl BranchCriteria for RequiresFile {
        fn kind(&self) -> CriteriaKind {
            CriteriaKind::new("requires-file")
        }

        fn is_head(&self, probe: &dyn Probe) -> bool {
            probe.exists("Jenkinsfile")
        }
    }

    #[test]
    fn test_every_branch_qualifies() {
        let policy = DefaultResolutionPolicy;
        assert!(policy.is_head(&StaticProbe::empty()));
        assert!(policy.is_head(&StaticProbe::with_files(["Jenkinsfile"])));
        assert!(policy.is_head(&StaticProbe::with_files(["README.md"])));
    }

    #[test]
    fn test_probe_is_never_consulted() {
        let probe = StaticProbe::empty();
        assert!(DefaultResolutionPolicy.is_qualifying(&probe));
        assert_eq!(probe.queries(), 0);
    }

    #[test]
    fn test_instances_are_interchangeable() {
        let first_pass = DefaultResolutionPolicy;
        let second_pass = DefaultResolutionPolicy::default();
        assert_eq!(first_pass, second_pass);
        assert!(same_criteria(&first_pass, &second_pass));

        let set: HashSet<_> = [first_pass, second_pass].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_different_kinds_differ() {
        assert!(!same_criteria(&DefaultResolutionPolicy, &RequiresFile));
        assert!(!RequiresFile.is_head(&StaticProbe::empty()));
    }
}
