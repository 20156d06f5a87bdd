//! Pipeline Defaults CLI
//!
//! The `pipeline-defaults` command reconciles a multi-branch container against
//! a list of branch names, binding every branch job to a registry script.
//!
//! ## Commands
//!
//! - `reconcile`: Run one pass and persist the resulting job set
//! - `config`: Show or edit a container's script binding
//! - `script`: Add or list registry scripts
//! - `kinds`: List registered project factory kinds

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use pipeline_defaults::{
    init_tracing, BranchDescriptor, ContainerConfig, DriverConfig, EngineError, ExecutionEngine,
    ExtensionRegistry, JobSnapshot, LogFormat, MultiBranchContainer, PassOutcome, PassReport,
    Probe, ProjectAttributes, ReconciliationDriver, ScriptBinding, METRICS,
};
use pipeline_registry::{FsScriptRegistry, ScriptEntry, ScriptRegistry};
use serde::{Deserialize, Serialize};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "pipeline-defaults")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Bind multi-branch jobs to a centrally managed pipeline script",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a container against the given branches
    Reconcile {
        /// Container config file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Script registry root directory
        #[arg(long, env = "PIPELINE_DEFAULTS_REGISTRY")]
        registry_dir: PathBuf,

        /// Job state file, created on first run
        #[arg(short, long)]
        state: PathBuf,

        /// Report output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Branch names discovered by the scan
        branches: Vec<String>,
    },

    /// Show or edit container configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Manage registry scripts
    Script {
        #[command(subcommand)]
        action: ScriptAction,
    },

    /// List registered project factory kinds
    Kinds,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the container configuration
    Show {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Set the script id (omit or pass "" to reset to the default)
    SetScriptId {
        #[arg(short, long)]
        config: PathBuf,

        script_id: Option<String>,
    },

    /// Enable or disable sandboxed execution
    SetSandbox {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Subcommand)]
enum ScriptAction {
    /// Register a script from a local file
    Add {
        #[arg(long, env = "PIPELINE_DEFAULTS_REGISTRY")]
        registry_dir: PathBuf,

        /// Registry id for the script
        script_id: String,

        /// File holding the script content
        file: PathBuf,

        /// Restrict the script to trusted (non-sandboxed) jobs
        #[arg(long)]
        trusted: bool,
    },

    /// List registered script ids
    List {
        #[arg(long, env = "PIPELINE_DEFAULTS_REGISTRY")]
        registry_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Persisted job set of one container.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    last_pass: u64,
    #[serde(default)]
    jobs: Vec<JobSnapshot>,
}

/// Probe for branches reconciled from names alone.
#[derive(Debug)]
struct NameOnlyProbe;

impl Probe for NameOnlyProbe {
    fn exists(&self, _path: &str) -> bool {
        false
    }
}

/// Engine that logs every bind. The job state file is the only record.
struct LoggingEngine;

#[async_trait]
impl ExecutionEngine for LoggingEngine {
    async fn bind_source(
        &self,
        job: &str,
        binding: &ScriptBinding,
        _attributes: &ProjectAttributes,
    ) -> std::result::Result<(), EngineError> {
        info!(job = %job, binding = %binding, "source bound");
        Ok(())
    }

    async fn unbind_source(&self, job: &str) -> std::result::Result<(), EngineError> {
        info!(job = %job, "source unbound");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(format, level);

    let result = match cli.command {
        Commands::Reconcile {
            config,
            registry_dir,
            state,
            format,
            branches,
        } => cmd_reconcile(&config, &registry_dir, &state, &branches, format).await,
        Commands::Config { action } => match action {
            ConfigAction::Show { config } => cmd_config_show(&config),
            ConfigAction::SetScriptId { config, script_id } => {
                cmd_config_set_script_id(&config, script_id.as_deref())
            }
            ConfigAction::SetSandbox { config, enabled } => {
                cmd_config_set_sandbox(&config, enabled)
            }
        },
        Commands::Script { action } => match action {
            ScriptAction::Add {
                registry_dir,
                script_id,
                file,
                trusted,
            } => cmd_script_add(&registry_dir, &script_id, &file, trusted).await,
            ScriptAction::List { registry_dir } => cmd_script_list(&registry_dir).await,
        },
        Commands::Kinds => cmd_kinds(),
    };

    METRICS.flush();
    result
}

/// Run one reconciliation pass and persist the job set
async fn cmd_reconcile(
    config_path: &Path,
    registry_dir: &Path,
    state_path: &Path,
    branches: &[String],
    format: OutputFormat,
) -> Result<()> {
    let report = run_reconcile(config_path, registry_dir, state_path, branches).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_report_text(&report)),
    }
    Ok(())
}

async fn run_reconcile(
    config_path: &Path,
    registry_dir: &Path,
    state_path: &Path,
    branches: &[String],
) -> Result<PassReport> {
    let config: ContainerConfig = read_json_file(config_path)?;
    let state = if state_path.exists() {
        read_json_file::<StateFile>(state_path)?
    } else {
        StateFile::default()
    };

    let container = MultiBranchContainer::restore(config, state.jobs, state.last_pass)
        .context("Failed to restore container state")?;
    let registry = FsScriptRegistry::new(registry_dir)
        .with_context(|| format!("Failed to open registry at {:?}", registry_dir))?;
    let driver_config = DriverConfig::from_env().map_err(|e| anyhow!(e))?;
    let driver = ReconciliationDriver::new(Arc::new(registry), Arc::new(LoggingEngine))
        .with_config(driver_config);

    let descriptors = branches
        .iter()
        .map(|name| BranchDescriptor::new(name.as_str(), Arc::new(NameOnlyProbe)))
        .collect();
    let report = driver.reconcile(&container, descriptors).await;

    if report.is_committed() {
        let state = StateFile {
            last_pass: container.last_committed_pass().await,
            jobs: container.snapshots().await,
        };
        write_json_file(state_path, &state)?;
    }
    Ok(report)
}

fn render_report_text(report: &PassReport) -> String {
    let mut out = String::new();
    match &report.outcome {
        PassOutcome::Committed => {
            out.push_str(&format!(
                "Pass {} on '{}' committed in {}ms\n",
                report.pass, report.container, report.duration_ms
            ));
        }
        PassOutcome::Superseded { latest } => {
            out.push_str(&format!(
                "Pass {} on '{}' superseded by pass {}\n",
                report.pass, report.container, latest
            ));
            return out;
        }
    }
    for (label, names) in [
        ("created", &report.created),
        ("updated", &report.updated),
        ("re-enabled", &report.reenabled),
        ("skipped", &report.skipped),
        ("orphaned", &report.orphaned),
        ("disabled", &report.disabled),
    ] {
        for name in names {
            out.push_str(&format!("  {:<11} {}\n", label, name));
        }
    }
    for failure in &report.failures {
        out.push_str(&format!("  {:<11} {}: {}\n", "failed", failure.branch, failure.message));
    }
    out
}

/// Print the container configuration
fn cmd_config_show(config_path: &Path) -> Result<()> {
    let config: ContainerConfig = read_json_file(config_path)?;
    println!("Container:   {}", config.name);
    println!("Kind:        {}", config.factory_kind);
    println!("Script id:   {}", config.factory.script_id());
    println!("Sandbox:     {}", config.factory.use_sandbox());
    if let Some(grace) = config.orphan_grace_passes {
        println!("Grace:       {} passes", grace);
    }
    Ok(())
}

fn cmd_config_set_script_id(config_path: &Path, script_id: Option<&str>) -> Result<()> {
    let mut config: ContainerConfig = read_json_file(config_path)?;
    config.factory.set_script_id(script_id);
    write_json_file(config_path, &config)?;
    println!("Script id set to '{}'", config.factory.script_id());
    Ok(())
}

fn cmd_config_set_sandbox(config_path: &Path, enabled: bool) -> Result<()> {
    let mut config: ContainerConfig = read_json_file(config_path)?;
    config.factory.set_use_sandbox(enabled);
    write_json_file(config_path, &config)?;
    println!("Sandbox {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

/// Register a script file in the registry
async fn cmd_script_add(
    registry_dir: &Path,
    script_id: &str,
    file: &Path,
    trusted: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read script file {:?}", file))?;
    let registry = FsScriptRegistry::new(registry_dir)
        .with_context(|| format!("Failed to open registry at {:?}", registry_dir))?;

    let mut entry = ScriptEntry::new(script_id, content);
    if trusted {
        entry = entry.trusted_only();
    }
    registry
        .register(&entry)
        .await
        .context(format!("Failed to register script '{}'", script_id))?;

    println!("Registered '{}' ({})", script_id, entry.digest().short());
    Ok(())
}

async fn cmd_script_list(registry_dir: &Path) -> Result<()> {
    let registry = FsScriptRegistry::new(registry_dir)
        .with_context(|| format!("Failed to open registry at {:?}", registry_dir))?;
    let ids = registry.list_ids().await?;
    if ids.is_empty() {
        println!("No scripts registered.");
        return Ok(());
    }
    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

/// List registered factory kinds
fn cmd_kinds() -> Result<()> {
    for (kind, display_name) in ExtensionRegistry::global().kinds() {
        println!("{:<20} {}", kind, display_name);
    }
    Ok(())
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {:?}", path))
}

fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))
}
