//! Structured observability hooks for the reconciliation lifecycle.
//!
//! - `pass_span` scoping log lines to one container pass
//! - Emission functions for pass start, finish, supersession and branch failures

use tracing::{info, warn, Span};

/// Span for one container pass. Attach it with `Instrument::instrument` so it
/// follows the pass across await points.
///
/// ```ignore
/// run_pass(..).instrument(pass_span("org/repo", 12)).await
/// // tracing calls inside carry container = "org/repo", pass = 12
/// ```
pub fn pass_span(container: &str, pass: u64) -> Span {
    tracing::info_span!("pipeline_defaults.pass", container = %container, pass = pass)
}

pub fn emit_pass_started(container: &str, pass: u64, branches: usize) {
    info!(event = "pass.started", container = %container, pass = pass, branches = branches);
}

pub fn emit_pass_finished(
    container: &str,
    pass: u64,
    created: usize,
    updated: usize,
    disabled: usize,
    failures: usize,
    duration_ms: u64,
) {
    info!(
        event = "pass.finished",
        container = %container,
        pass = pass,
        created = created,
        updated = updated,
        disabled = disabled,
        failures = failures,
        duration_ms = duration_ms,
    );
}

/// A newer scan was triggered; this pass was discarded without committing.
pub fn emit_pass_superseded(container: &str, pass: u64, latest: u64) {
    info!(event = "pass.superseded", container = %container, pass = pass, latest = latest);
}

pub fn emit_branch_failed(container: &str, branch: &str, error: &dyn std::fmt::Display) {
    warn!(event = "branch.failed", container = %container, branch = %branch, error = %error);
}
