//! Registry of available project factory kinds.
//!
//! Each kind is described by a [`FactoryDescriptor`] exposing a display name
//! and a construct-on-demand factory method. The defaults kind is always
//! present in [`ExtensionRegistry::global`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, ReconcileResult};
use crate::factory::ProjectFactory;
use crate::DEFAULT_SCRIPT_ID;

/// Tag naming a project factory kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactoryKind(String);

impl FactoryKind {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Kind of the registry-default factory.
    pub fn defaults() -> Self {
        Self::new("pipeline-defaults")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FactoryKind {
    fn default() -> Self {
        Self::defaults()
    }
}

impl fmt::Display for FactoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Describes one factory kind to the host.
pub trait FactoryDescriptor: Send + Sync {
    fn kind(&self) -> FactoryKind;

    fn display_name(&self) -> String;

    /// Build a freshly configured factory, or `None` when the kind is not
    /// meant to be instantiated automatically.
    fn new_instance(&self) -> Option<ProjectFactory>;
}

/// Descriptor for the registry-default factory.
#[derive(Debug, Default)]
pub struct DefaultsFactoryDescriptor;

impl FactoryDescriptor for DefaultsFactoryDescriptor {
    fn kind(&self) -> FactoryKind {
        FactoryKind::defaults()
    }

    fn display_name(&self) -> String {
        format!("by default {}", DEFAULT_SCRIPT_ID)
    }

    fn new_instance(&self) -> Option<ProjectFactory> {
        Some(ProjectFactory::new())
    }
}

/// Kind-keyed set of factory descriptors.
pub struct ExtensionRegistry {
    descriptors: RwLock<BTreeMap<FactoryKind, Arc<dyn FactoryDescriptor>>>,
}

impl ExtensionRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            descriptors: RwLock::new(BTreeMap::new()),
        }
    }

    /// A registry holding the defaults descriptor.
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry
            .descriptors
            .write()
            .unwrap()
            .insert(FactoryKind::defaults(), Arc::new(DefaultsFactoryDescriptor));
        registry
    }

    /// Process-wide registry, initialized with the defaults descriptor.
    pub fn global() -> &'static ExtensionRegistry {
        static GLOBAL: OnceLock<ExtensionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ExtensionRegistry::with_defaults)
    }

    /// Add a descriptor. Fails if its kind is already registered.
    pub fn register(&self, descriptor: Arc<dyn FactoryDescriptor>) -> ReconcileResult<()> {
        let kind = descriptor.kind();
        let mut descriptors = self.descriptors.write().unwrap();
        if descriptors.contains_key(&kind) {
            return Err(ReconcileError::DuplicateFactoryKind(kind.to_string()));
        }
        descriptors.insert(kind, descriptor);
        Ok(())
    }

    pub fn get(&self, kind: &FactoryKind) -> Option<Arc<dyn FactoryDescriptor>> {
        self.descriptors.read().unwrap().get(kind).cloned()
    }

    /// `(kind, display name)` pairs in kind order.
    pub fn kinds(&self) -> Vec<(FactoryKind, String)> {
        self.descriptors
            .read()
            .unwrap()
            .iter()
            .map(|(kind, d)| (kind.clone(), d.display_name()))
            .collect()
    }

    /// Construct a factory of `kind` on demand.
    pub fn instantiate(&self, kind: &FactoryKind) -> Option<ProjectFactory> {
        self.get(kind).and_then(|d| d.new_instance())
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ManualOnly;

    impl FactoryDescriptor for ManualOnly {
        fn kind(&self) -> FactoryKind {
            FactoryKind::new("manual-only")
        }

        fn display_name(&self) -> String {
            "manual only".to_string()
        }

        fn new_instance(&self) -> Option<ProjectFactory> {
            None
        }
    }

    #[test]
    fn test_defaults_display_name() {
        assert_eq!(
            DefaultsFactoryDescriptor.display_name(),
            "by default Jenkinsfile"
        );
    }

    #[test]
    fn test_global_has_defaults() {
        let registry = ExtensionRegistry::global();
        let factory = registry.instantiate(&FactoryKind::defaults()).unwrap();
        assert_eq!(factory, ProjectFactory::new());
    }

    #[test]
    fn test_register_and_list() {
        let registry = ExtensionRegistry::with_defaults();
        registry.register(Arc::new(ManualOnly)).unwrap();

        let kinds = registry.kinds();
        assert_eq!(kinds.len(), 2);
        assert_eq!(kinds[0].0.as_str(), "manual-only");
        assert_eq!(kinds[1].1, "by default Jenkinsfile");
        assert!(registry.instantiate(&FactoryKind::new("manual-only")).is_none());
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let registry = ExtensionRegistry::with_defaults();
        let err = registry
            .register(Arc::new(DefaultsFactoryDescriptor))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::DuplicateFactoryKind(_)));
    }

    #[test]
    fn test_unknown_kind() {
        let registry = ExtensionRegistry::empty();
        assert!(registry.get(&FactoryKind::defaults()).is_none());
        assert!(registry.instantiate(&FactoryKind::defaults()).is_none());
    }
}
