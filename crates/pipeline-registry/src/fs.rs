//! Filesystem-backed script registry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::RegistryError;
use crate::registry::{validate_script_id, ScriptAccess, ScriptEntry, ScriptRegistry};
use crate::Result;

/// Directory-backed script registry.
///
/// Layout:
/// - `<root>/scripts/<script_id>`: unrestricted entries
/// - `<root>/trusted/<script_id>`: entries readable by trusted jobs only
///
/// An id present in both directories resolves to the trusted entry.
pub struct FsScriptRegistry {
    scripts_dir: PathBuf,
    trusted_dir: PathBuf,
}

impl FsScriptRegistry {
    /// Open a registry rooted at `root`. Creates both subdirectories if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let scripts_dir = root.as_ref().join("scripts");
        let trusted_dir = root.as_ref().join("trusted");
        std::fs::create_dir_all(&scripts_dir)?;
        std::fs::create_dir_all(&trusted_dir)?;
        Ok(Self {
            scripts_dir,
            trusted_dir,
        })
    }

    /// Write an entry to disk, replacing any previous content.
    pub async fn register(&self, entry: &ScriptEntry) -> Result<()> {
        validate_script_id(&entry.script_id)?;
        let dir = match entry.access {
            ScriptAccess::Unrestricted => &self.scripts_dir,
            ScriptAccess::TrustedOnly => &self.trusted_dir,
        };
        tokio::fs::write(dir.join(&entry.script_id), entry.content.as_bytes()).await?;
        Ok(())
    }

    async fn read_entry(
        &self,
        dir: &Path,
        script_id: &str,
        access: ScriptAccess,
    ) -> Result<Option<ScriptEntry>> {
        let path = dir.join(script_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let content =
                    String::from_utf8(bytes).map_err(|e| RegistryError::Unreadable {
                        script_id: script_id.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(ScriptEntry {
                    script_id: script_id.to_string(),
                    content,
                    access,
                }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::Unreadable {
                script_id: script_id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ScriptRegistry for FsScriptRegistry {
    async fn lookup(&self, script_id: &str) -> Result<ScriptEntry> {
        validate_script_id(script_id)?;
        debug!(script_id = %script_id, "registry lookup");

        if let Some(entry) = self
            .read_entry(&self.trusted_dir, script_id, ScriptAccess::TrustedOnly)
            .await?
        {
            return Ok(entry);
        }
        self.read_entry(&self.scripts_dir, script_id, ScriptAccess::Unrestricted)
            .await?
            .ok_or_else(|| RegistryError::NotFound {
                script_id: script_id.to_string(),
            })
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for dir in [&self.scripts_dir, &self.trusted_dir] {
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    ids.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
