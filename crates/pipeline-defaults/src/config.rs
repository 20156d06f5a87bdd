//! Driver configuration.

use serde::{Deserialize, Serialize};

/// Passes a vanished branch's job survives before it is disabled.
pub const DEFAULT_ORPHAN_GRACE_PASSES: u32 = 2;

/// Environment variable overriding [`DriverConfig::orphan_grace_passes`].
pub const GRACE_PASSES_ENV: &str = "PIPELINE_DEFAULTS_GRACE_PASSES";

/// Settings shared by every container a driver reconciles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Consecutive missed passes after which an orphaned job is disabled.
    /// Containers may override this in their own config.
    pub orphan_grace_passes: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            orphan_grace_passes: DEFAULT_ORPHAN_GRACE_PASSES,
        }
    }
}

impl DriverConfig {
    /// Set the orphan grace period.
    pub fn with_orphan_grace_passes(mut self, passes: u32) -> Self {
        self.orphan_grace_passes = passes;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - PIPELINE_DEFAULTS_GRACE_PASSES (optional, default: 2)
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> std::result::Result<Self, String> {
        let mut config = Self::default();
        if let Some(raw) = lookup(GRACE_PASSES_ENV) {
            config.orphan_grace_passes = raw.trim().parse().map_err(|e| {
                format!("{} must be a non-negative integer: {}", GRACE_PASSES_ENV, e)
            })?;
        }
        Ok(config)
    }
}
