//! In-memory fakes for the registry trait (testing only)
//!
//! Provides `MemoryScriptRegistry`, which satisfies the `ScriptRegistry`
//! contract without touching the filesystem, and can be told to fail lookups
//! for particular identifiers.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::registry::{ScriptEntry, ScriptRegistry};
use crate::Result;

/// In-memory registry backed by a `BTreeMap<script_id, entry>`.
#[derive(Debug, Default)]
pub struct MemoryScriptRegistry {
    entries: Mutex<BTreeMap<String, ScriptEntry>>,
    unreadable: Mutex<HashSet<String>>,
}

impl MemoryScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry pre-populated with `(id, content)` pairs.
    pub fn with_scripts<'a>(scripts: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let registry = Self::new();
        for (id, content) in scripts {
            registry.insert(ScriptEntry::new(id, content));
        }
        registry
    }

    /// Register or replace an entry.
    pub fn insert(&self, entry: ScriptEntry) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(entry.script_id.clone(), entry);
    }

    /// Remove an entry. No-op if absent.
    pub fn remove(&self, script_id: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(script_id);
    }

    /// Make every lookup of `script_id` fail with `Unreadable`.
    pub fn fail_lookups_for(&self, script_id: &str) {
        let mut unreadable = self.unreadable.lock().unwrap();
        unreadable.insert(script_id.to_string());
    }
}

#[async_trait]
impl ScriptRegistry for MemoryScriptRegistry {
    async fn lookup(&self, script_id: &str) -> Result<ScriptEntry> {
        if self.unreadable.lock().unwrap().contains(script_id) {
            return Err(RegistryError::Unreadable {
                script_id: script_id.to_string(),
                reason: "lookup failure injected".to_string(),
            });
        }
        let entries = self.entries.lock().unwrap();
        entries
            .get(script_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                script_id: script_id.to_string(),
            })
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.keys().cloned().collect())
    }
}
