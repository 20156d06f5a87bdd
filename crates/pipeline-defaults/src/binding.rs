//! Script binding: which registry script a job runs, and how.

use pipeline_registry::DEFAULT_SCRIPT_ID;
use serde::{Deserialize, Serialize};

/// Normalize a configured script id.
///
/// `None`, empty, and whitespace-only input all map to [`DEFAULT_SCRIPT_ID`];
/// anything else is kept verbatim.
pub fn normalize_script_id(script_id: Option<&str>) -> String {
    match script_id {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => DEFAULT_SCRIPT_ID.to_string(),
    }
}

/// The `(script_id, use_sandbox)` pair that determines how a job's pipeline is
/// sourced and executed.
///
/// `script_id` is never blank: normalization happens on construction and on
/// deserialization, so every value in circulation is already valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "BindingFields")]
pub struct ScriptBinding {
    script_id: String,
    use_sandbox: bool,
}

#[derive(Deserialize)]
struct BindingFields {
    #[serde(default)]
    script_id: Option<String>,
    #[serde(default)]
    use_sandbox: bool,
}

impl From<BindingFields> for ScriptBinding {
    fn from(fields: BindingFields) -> Self {
        ScriptBinding::new(fields.script_id.as_deref(), fields.use_sandbox)
    }
}

impl ScriptBinding {
    pub fn new(script_id: Option<&str>, use_sandbox: bool) -> Self {
        Self {
            script_id: normalize_script_id(script_id),
            use_sandbox,
        }
    }

    pub fn script_id(&self) -> &str {
        &self.script_id
    }

    pub fn use_sandbox(&self) -> bool {
        self.use_sandbox
    }

    pub(crate) fn set_script_id(&mut self, script_id: Option<&str>) {
        self.script_id = normalize_script_id(script_id);
    }

    pub(crate) fn set_use_sandbox(&mut self, use_sandbox: bool) {
        self.use_sandbox = use_sandbox;
    }
}

impl Default for ScriptBinding {
    fn default() -> Self {
        Self::new(None, false)
    }
}

impl std::fmt::Display for ScriptBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.use_sandbox { "sandbox" } else { "trusted" };
        write!(f, "{} ({})", self.script_id, mode)
    }
}
