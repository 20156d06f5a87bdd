//! Script registry trait and entry types
//!
//! The registry maps an opaque script identifier to pipeline script content.
//! Implementations:
//! - [`crate::fakes::MemoryScriptRegistry`] for tests
//! - [`crate::fs::FsScriptRegistry`] for a directory on disk

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RegistryError;
use crate::Result;

/// Identifier used when no script id has been configured.
pub const DEFAULT_SCRIPT_ID: &str = "Jenkinsfile";

/// Who may read a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptAccess {
    /// Readable by sandboxed and trusted jobs alike.
    #[default]
    Unrestricted,
    /// Only jobs running in trusted (non-sandboxed) mode may read the entry.
    TrustedOnly,
}

/// SHA-256 digest of a script's content (lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptDigest(String);

impl ScriptDigest {
    /// Compute the digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ScriptDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ScriptDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named pipeline script held by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub script_id: String,
    pub content: String,
    #[serde(default)]
    pub access: ScriptAccess,
}

impl ScriptEntry {
    pub fn new(script_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            script_id: script_id.into(),
            content: content.into(),
            access: ScriptAccess::Unrestricted,
        }
    }

    /// Mark the entry as readable by trusted jobs only.
    pub fn trusted_only(mut self) -> Self {
        self.access = ScriptAccess::TrustedOnly;
        self
    }

    /// Whether a job with the given sandbox mode may read this entry.
    pub fn readable_by(&self, use_sandbox: bool) -> bool {
        match self.access {
            ScriptAccess::Unrestricted => true,
            ScriptAccess::TrustedOnly => !use_sandbox,
        }
    }

    pub fn digest(&self) -> ScriptDigest {
        ScriptDigest::from_bytes(self.content.as_bytes())
    }
}

/// Reject identifiers that cannot name a registry entry.
///
/// Identifiers are flat names: non-blank, no path separators, no `.`/`..`.
pub fn validate_script_id(script_id: &str) -> Result<()> {
    let trimmed = script_id.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || script_id.contains('/')
        || script_id.contains('\\')
        || script_id.contains('\0')
    {
        return Err(RegistryError::InvalidScriptId(script_id.to_string()));
    }
    Ok(())
}

/// Centralized store of named pipeline scripts.
///
/// Guarantees:
/// - `lookup(id)` returns `RegistryError::NotFound` when nothing is registered
///   under `id`.
/// - Lookups are side-effect free and may be cached by implementations.
#[async_trait]
pub trait ScriptRegistry: Send + Sync {
    /// Read the entry registered under `script_id`.
    async fn lookup(&self, script_id: &str) -> Result<ScriptEntry>;

    /// Whether an entry exists under `script_id`.
    async fn contains(&self, script_id: &str) -> Result<bool> {
        match self.lookup(script_id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List registered identifiers in sorted order.
    async fn list_ids(&self) -> Result<Vec<String>>;
}
