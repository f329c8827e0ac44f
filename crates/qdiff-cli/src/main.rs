//! qdiff - differential testing of circuit conversion backends
//!
//! ## Commands
//!
//! - `matrix run`: export, import and compare circuits across every backend in a manifest
//! - `matrix list`: show the capabilities a manifest registers
//! - `coverage run`: one budgeted coverage collection pass over a working folder
//! - `coverage status`: sentinel and latest result folder of a campaign
//!
//! Capability and script failures are recorded, not fatal: the exit code is
//! non-zero only for configuration errors.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use qdiff_core::{
    write_summary_json, CapabilityRegistry, MatrixConfig, MatrixExecutor, MatrixManifest,
    MatrixOutcome, MatrixStatus, MatrixSummaryArtifact, NamedCircuit, Role,
};
use qdiff_cov::{
    rotator, BudgetDecision, CampaignOutcome, CollectionOutcome, CollectorConfig,
    CoverageCampaign, FollowUpCommand, Sentinel,
};

#[derive(Parser)]
#[command(name = "qdiff")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Differential testing of quantum circuit conversion backends", long_about = None)]
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
    /// Capability-matrix execution
    Matrix {
        #[command(subcommand)]
        action: MatrixAction,
    },

    /// Coverage collection campaigns
    Coverage {
        #[command(subcommand)]
        action: CoverageAction,
    },
}

#[derive(Subcommand)]
enum MatrixAction {
    /// Run every circuit file through the capability matrix
    Run {
        /// JSON manifest listing exporter, importer and comparator commands
        #[arg(short, long)]
        manifest: PathBuf,

        /// Circuit files; each one is a separate matrix pass
        #[arg(short, long = "circuit", required = true)]
        circuits: Vec<PathBuf>,

        /// Directory for artifacts and failure records
        #[arg(short, long, default_value = "qdiff-out")]
        output_dir: PathBuf,

        /// Keep only capabilities whose identifier starts with this prefix
        #[arg(long)]
        only: Option<String>,

        /// Write a JSON summary of all passes here
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Maximum concurrent capability calls per stage
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// List the capabilities a manifest registers
    List {
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

#[derive(Subcommand)]
enum CoverageAction {
    /// Run one collection pass unless the campaign has timed out
    Run {
        /// Folder the collection scripts analyse
        #[arg(long)]
        working_folder: PathBuf,

        /// Root for numbered result folders
        #[arg(long)]
        output_folder: PathBuf,

        /// Campaign deadline, unix seconds
        #[arg(long)]
        end_timestamp: Option<i64>,

        /// Directory with collect_*.sh scripts
        #[arg(long, env = "FOLDER_WITH_COVERAGE_COLLECTION_SCRIPTS")]
        scripts_dir: Option<PathBuf>,

        /// Command launched detached on each new result folder ({folder} is substituted)
        #[arg(long, env = "QDIFF_FOLLOWUP_COMMAND")]
        followup: Option<String>,

        /// Program the scripts are run with
        #[arg(long, default_value = "bash")]
        interpreter: String,

        /// Extension of the report files to collect
        #[arg(long, default_value = "xml")]
        artifact_extension: String,
    },

    /// Show whether a campaign has timed out and where its last results are
    Status {
        #[arg(long)]
        working_folder: PathBuf,

        #[arg(long)]
        output_folder: Option<PathBuf>,
    },
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
    qdiff_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Matrix { action } => match action {
            MatrixAction::Run {
                manifest,
                circuits,
                output_dir,
                only,
                summary,
                jobs,
            } => {
                cmd_matrix_run(
                    &manifest,
                    &circuits,
                    &output_dir,
                    only.as_deref(),
                    summary.as_deref(),
                    jobs,
                )
                .await
            }
            MatrixAction::List { manifest } => cmd_matrix_list(&manifest),
        },
        Commands::Coverage { action } => match action {
            CoverageAction::Run {
                working_folder,
                output_folder,
                end_timestamp,
                scripts_dir,
                followup,
                interpreter,
                artifact_extension,
            } => {
                let config = collector_config(
                    working_folder,
                    output_folder,
                    end_timestamp,
                    scripts_dir,
                    followup.as_deref(),
                    interpreter,
                    artifact_extension,
                )?;
                cmd_coverage_run(config).await
            }
            CoverageAction::Status {
                working_folder,
                output_folder,
            } => cmd_coverage_status(&working_folder, output_folder.as_deref()),
        },
    }
}

fn load_registry(manifest: &Path, only: Option<&str>) -> Result<CapabilityRegistry<PathBuf>> {
    let registry = MatrixManifest::load(manifest)
        .with_context(|| format!("Failed to load manifest {}", manifest.display()))?
        .into_registry::<PathBuf>()
        .context("Invalid capability in manifest")?;
    Ok(match only {
        Some(prefix) => registry.retain(prefix),
        None => registry,
    })
}

/// Circuit name (file stem) and source identifier (file name) of a circuit file.
fn circuit_identity(path: &Path) -> Result<(String, String)> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Circuit path has no usable file name: {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(stem);
    Ok((stem.to_string(), file_name.to_string()))
}

async fn cmd_matrix_run(
    manifest: &Path,
    circuits: &[PathBuf],
    output_dir: &Path,
    only: Option<&str>,
    summary: Option<&Path>,
    jobs: Option<usize>,
) -> Result<()> {
    let registry = load_registry(manifest, only)?;
    if registry.is_empty() {
        anyhow::bail!("No capabilities registered from {}", manifest.display());
    }

    for circuit in circuits {
        if !circuit.is_file() {
            anyhow::bail!("Circuit file not found: {}", circuit.display());
        }
    }

    println!("Manifest: {}", manifest.display());
    println!(
        "Capabilities: {} exporters, {} importers, {} comparators",
        registry.exporters().len(),
        registry.importers().len(),
        registry.comparators().len()
    );
    println!();

    let mut outcomes: Vec<MatrixOutcome> = Vec::with_capacity(circuits.len());
    for circuit in circuits {
        let (name, source) = circuit_identity(circuit)?;
        let mut config = MatrixConfig::new(output_dir, source);
        if let Some(jobs) = jobs {
            config = config.with_max_concurrency(jobs);
        }
        let executor = MatrixExecutor::new(registry.clone(), config);
        let outcome = executor
            .run(&NamedCircuit::new(name, circuit.clone()))
            .await;
        print_outcome(&outcome);
        outcomes.push(outcome);
    }

    let artifact = MatrixSummaryArtifact::new(outcomes);
    println!(
        "Summary: {} circuits, {} artifacts, {} failures",
        artifact.totals.circuits,
        artifact.totals.artifacts,
        artifact.totals.total_failures()
    );

    if let Some(path) = summary {
        write_summary_json(path, &artifact)?;
        info!(path = %path.display(), "matrix summary written");
    }
    Ok(())
}

fn print_outcome(outcome: &MatrixOutcome) {
    let status = match (outcome.status, outcome.failures.is_empty()) {
        (MatrixStatus::NoArtifacts, _) => "✗ NO ARTIFACTS",
        (MatrixStatus::Completed, true) => "✓ CLEAN",
        (MatrixStatus::Completed, false) => "✗ FAILURES",
    };
    println!("{} {}", status, outcome.circuit_name);
    println!(
        "  artifacts: {}/{}  imports: {}  comparisons: {}  ({}ms)",
        outcome.artifacts.len(),
        outcome.export_attempts,
        outcome.import_attempts,
        outcome.compare_invocations,
        outcome.duration_ms
    );
    for failure in &outcome.failures {
        let stage = failure
            .record
            .stage
            .map(|s| s.to_string())
            .unwrap_or_default();
        let location = failure
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not saved)".to_string());
        println!(
            "  - [{}] {}: {}",
            stage,
            failure.record.involved_capabilities.join(", "),
            location
        );
    }
}

fn cmd_matrix_list(manifest: &Path) -> Result<()> {
    let registry = load_registry(manifest, None)?;
    for role in Role::ALL {
        let ids = registry.identifiers(role);
        println!("{} ({}):", role, ids.len());
        for id in ids {
            println!("  {}", id);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn collector_config(
    working_folder: PathBuf,
    output_folder: PathBuf,
    end_timestamp: Option<i64>,
    scripts_dir: Option<PathBuf>,
    followup: Option<&str>,
    interpreter: String,
    artifact_extension: String,
) -> Result<CollectorConfig> {
    let mut config = CollectorConfig::new(working_folder, output_folder)
        .with_interpreter(interpreter)
        .with_artifact_extension(artifact_extension);
    if let Some(dir) = scripts_dir {
        config = config.with_scripts_dir(dir);
    }
    if let Some(secs) = end_timestamp {
        let deadline = DateTime::<Utc>::from_timestamp(secs, 0)
            .with_context(|| format!("End timestamp out of range: {secs}"))?;
        config = config.with_end_timestamp(deadline);
    }
    if let Some(template) = followup.and_then(FollowUpCommand::parse) {
        config = config.with_followup(template);
    }
    Ok(config)
}

async fn cmd_coverage_run(config: CollectorConfig) -> Result<()> {
    let outcome = CoverageCampaign::new(config)
        .run()
        .await
        .context("Coverage collection failed")?;

    match outcome {
        CampaignOutcome::Halted { diagnostic } => {
            println!("Timeout file found, exiting: {}", diagnostic);
        }
        CampaignOutcome::Ran { collection, stop } => {
            match &collection {
                CollectionOutcome::NothingToDo => println!("No collection scripts found"),
                CollectionOutcome::NoArtifacts { report } => {
                    println!(
                        "Ran {} scripts ({} failed); no report files to collect",
                        report.scripts.len(),
                        report.failed_count()
                    );
                }
                CollectionOutcome::Collected { report } => {
                    for script in &report.scripts {
                        let status = if script.passed() { "✓" } else { "✗" };
                        println!(
                            "  {} {} ({}ms, exit code: {})",
                            status, script.script_name, script.duration_ms, script.exit_code
                        );
                    }
                    if let Some(folder) = &report.result_folder {
                        println!(
                            "Moved {} report files to {}",
                            report.moved_artifacts.len(),
                            folder.display()
                        );
                    }
                    println!("Coverage computation time: {:.3}s", report.elapsed_secs);
                }
            }
            if let BudgetDecision::Halt { diagnostic } = stop {
                println!("Current time exceeds end timestamp: {}", diagnostic);
            }
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct CoverageStatus {
    timed_out: bool,
    diagnostic: Option<String>,
    latest_result_folder: Option<PathBuf>,
}

fn cmd_coverage_status(working_folder: &Path, output_folder: Option<&Path>) -> Result<()> {
    let sentinel = Sentinel::in_folder(working_folder);
    let latest = match output_folder {
        Some(root) => rotator::latest(root)
            .with_context(|| format!("Failed to read {}", root.display()))?,
        None => None,
    };
    let status = CoverageStatus {
        timed_out: sentinel.is_present(),
        diagnostic: sentinel.diagnostic(),
        latest_result_folder: latest,
    };
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_circuit_identity() {
        let (name, source) = circuit_identity(Path::new("/tmp/prog_0007.qasm")).expect("identity");
        assert_eq!(name, "prog_0007");
        assert_eq!(source, "prog_0007.qasm");
    }

    #[test]
    fn test_matrix_run_requires_circuit() {
        let parsed = Cli::try_parse_from(["qdiff", "matrix", "run", "--manifest", "m.json"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_collector_config_from_flags() {
        let config = collector_config(
            PathBuf::from("/work"),
            PathBuf::from("/out"),
            Some(1_700_000_000),
            Some(PathBuf::from("/scripts")),
            Some("compute-coverage --folder {folder}"),
            "bash".to_string(),
            "xml".to_string(),
        )
        .expect("config");
        assert_eq!(
            config.end_timestamp.map(|d| d.timestamp()),
            Some(1_700_000_000)
        );
        assert_eq!(
            config.scripts_dir().expect("scripts dir"),
            Path::new("/scripts")
        );
        assert!(config.followup.is_some());
    }

    #[test]
    fn test_load_registry_with_prefix_filter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = dir.path().join("manifest.json");
        std::fs::write(
            &manifest,
            r#"{
                "exporters": [
                    {"name": "export_to_qasm_with_qiskit", "argv": ["cp", "{circuit}", "{output}"]},
                    {"name": "export_to_qasm_with_pytket", "argv": ["cp", "{circuit}", "{output}"]}
                ],
                "comparators": [{"name": "compare_qasm_via_cmp", "argv": ["cmp", "{a}", "{b}"]}]
            }"#,
        )
        .expect("write manifest");

        let all = load_registry(&manifest, None).expect("registry");
        assert_eq!(all.len(), 3);
        let exporters = load_registry(&manifest, Some("export_")).expect("registry");
        assert_eq!(exporters.identifiers(Role::Export).len(), 2);
        assert!(exporters.identifiers(Role::Compare).is_empty());
    }
}
