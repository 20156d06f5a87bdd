//! Pipeline Defaults - multi-branch jobs bound to a centrally managed script
//!
//! Provides the materialization engine that:
//! - Qualifies every discovered branch as a buildable head
//! - Binds each branch job to a registry script `(script_id, use_sandbox)`
//! - Reconciles the job set against each scan (create, update, disable)

pub mod actions;
pub mod binding;
pub mod config;
pub mod container;
pub mod driver;
pub mod engine;
pub mod error;
pub mod extension;
pub mod factory;
pub mod fakes;
pub mod job;
pub mod metrics;
pub mod obs;
pub mod policy;
pub mod scan;
pub mod telemetry;

// Re-export key types
pub use actions::{container_actions, Caller, ContainerAction, Permission};
pub use binding::{normalize_script_id, ScriptBinding};
pub use config::DriverConfig;
pub use container::{ContainerConfig, MultiBranchContainer};
pub use driver::{BranchFailure, FailureKind, PassOutcome, PassReport, ReconciliationDriver};
pub use engine::{EngineError, ExecutionEngine};
pub use error::{ReconcileError, ReconcileResult};
pub use extension::{DefaultsFactoryDescriptor, ExtensionRegistry, FactoryDescriptor, FactoryKind};
pub use factory::ProjectFactory;
pub use job::{Job, JobKind, JobSnapshot, ProjectAttributes, ScriptSource};
pub use metrics::METRICS;
pub use policy::{BranchCriteria, CriteriaKind, DefaultResolutionPolicy};
pub use scan::{BranchDescriptor, BranchScanner, Probe};
pub use telemetry::{init_tracing, LogFormat};

pub use pipeline_registry::DEFAULT_SCRIPT_ID;

/// Pipeline Defaults version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
