//! Pipeline-Registry: centrally managed pipeline scripts
//!
//! This crate provides the storage side of default pipeline resolution: a
//! key-value store of named pipeline scripts that branch jobs are bound to
//! when their repository carries no pipeline file of its own.
//!
//! ## Layer 0 - Data
//!
//! Focus: lookups by script identifier. The resolution engine only ever passes
//! identifiers through; it never inspects script content.
//!
//! ## Key Components
//!
//! - `ScriptRegistry`: async lookup trait
//! - `ScriptEntry`: script content plus its access restriction
//! - `FsScriptRegistry`: directory-backed registry
//! - `fakes::MemoryScriptRegistry`: in-memory registry for tests

mod error;
pub mod fakes;
pub mod fs;
pub mod registry;

pub use error::RegistryError;
pub use fs::FsScriptRegistry;
pub use registry::{
    validate_script_id, ScriptAccess, ScriptDigest, ScriptEntry, ScriptRegistry, DEFAULT_SCRIPT_ID,
};

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
