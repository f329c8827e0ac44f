//! One coverage collection pass.
//!
//! ```text
//!   discover scripts ─→ run each (sequential) ─→ allocate NNNN/ ─→ move reports
//!                                                   └─→ stats line, time.json, follow-up
//! ```
//!
//! Script failures are logged and recorded, never fatal. Only a missing
//! configuration or an invalid working folder aborts the pass.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::error::{CoverageError, Result};
use crate::rotator;
use crate::runner::{ScriptResult, ScriptRunner};
use crate::script::discover_scripts;
use crate::stats::{self, STATS_FILE_NAME};

const LOG_TAIL: usize = 2000;

/// What a collection pass did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionReport {
    pub scripts: Vec<ScriptResult>,

    /// Newly allocated result folder, if any reports were found.
    pub result_folder: Option<PathBuf>,

    /// Report files now inside the result folder.
    pub moved_artifacts: Vec<PathBuf>,

    /// Stats line carried into the result folder.
    pub stats_line: Option<String>,

    /// Seconds from start of the pass to the timing record.
    pub elapsed_secs: f64,

    /// Pid of the detached follow-up, when one was launched.
    pub followup_pid: Option<u32>,
}

impl CollectionReport {
    fn new(scripts: Vec<ScriptResult>) -> Self {
        Self {
            scripts,
            result_folder: None,
            moved_artifacts: Vec::new(),
            stats_line: None,
            elapsed_secs: 0.0,
            followup_pid: None,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.scripts.iter().filter(|s| s.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.scripts.len() - self.passed_count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollectionOutcome {
    /// No matching script in the scripts directory.
    NothingToDo,
    /// Scripts ran but left no report files; no folder was allocated.
    NoArtifacts { report: CollectionReport },
    /// Reports were moved into a new result folder.
    Collected { report: CollectionReport },
}

impl CollectionOutcome {
    pub fn report(&self) -> Option<&CollectionReport> {
        match self {
            CollectionOutcome::NothingToDo => None,
            CollectionOutcome::NoArtifacts { report } | CollectionOutcome::Collected { report } => {
                Some(report)
            }
        }
    }

    pub fn result_folder(&self) -> Option<&PathBuf> {
        self.report().and_then(|r| r.result_folder.as_ref())
    }
}

/// Runs collection scripts and files their reports away.
pub struct CoverageCollector {
    config: CollectorConfig,
    runner: ScriptRunner,
}

impl CoverageCollector {
    pub fn new(config: CollectorConfig) -> Self {
        let runner = ScriptRunner::new(config.interpreter.clone());
        Self { config, runner }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub async fn collect(&self) -> Result<CollectionOutcome> {
        let start = Instant::now();
        let config = &self.config;

        let scripts_dir = config.scripts_dir()?;
        if !config.working_folder.is_dir() {
            return Err(CoverageError::InvalidWorkingFolder(
                config.working_folder.clone(),
            ));
        }

        let scripts =
            discover_scripts(scripts_dir, &config.script_prefix, &config.script_extension)?;
        if scripts.is_empty() {
            info!(
                scripts_dir = %scripts_dir.display(),
                "no collection scripts found"
            );
            return Ok(CollectionOutcome::NothingToDo);
        }

        info!(
            event = "coverage.started",
            scripts = scripts.len(),
            working_folder = %config.working_folder.display(),
        );

        let mut results = Vec::with_capacity(scripts.len());
        for script in &scripts {
            info!(script = %script.name, "executing collection script");
            let result = match self.runner.execute(script, &config.working_folder).await {
                Ok(result) => result,
                Err(e) => ScriptResult::spawn_failed(&script.name, &e),
            };
            log_script_result(&result);
            results.push(result);
        }

        let mut report = CollectionReport::new(results);

        if rotator::list_artifacts(&config.working_folder, &config.artifact_extension)?.is_empty() {
            warn!(
                event = "coverage.no_artifacts",
                extension = %config.artifact_extension,
                "no report files found in working folder"
            );
            report.elapsed_secs = start.elapsed().as_secs_f64();
            return Ok(CollectionOutcome::NoArtifacts { report });
        }

        let folder = rotator::allocate(&config.output_root)?;
        report.moved_artifacts =
            rotator::move_artifacts(&config.working_folder, &folder, &config.artifact_extension)?;
        info!(
            moved = report.moved_artifacts.len(),
            folder = %folder.display(),
            "moved report files"
        );

        report.stats_line =
            stats::carry_forward_last_line(&config.working_folder, &folder, STATS_FILE_NAME)?;

        let elapsed: Duration = start.elapsed();
        stats::write_timing_record(&folder, elapsed)?;
        report.elapsed_secs = elapsed.as_secs_f64();

        if let Some(followup) = &config.followup {
            match followup.spawn_detached(&folder) {
                Ok(pid) => report.followup_pid = pid,
                Err(e) => warn!(
                    event = "coverage.followup_failed",
                    folder = %folder.display(),
                    error = %e,
                ),
            }
        }

        info!(
            event = "coverage.finished",
            folder = %folder.display(),
            passed = report.passed_count(),
            failed = report.failed_count(),
            elapsed_secs = report.elapsed_secs,
        );
        report.result_folder = Some(folder);
        Ok(CollectionOutcome::Collected { report })
    }
}

fn log_script_result(result: &ScriptResult) {
    if !result.stdout.is_empty() {
        debug!(script = %result.script_name, stdout = %tail(&result.stdout), "script stdout");
    }
    if result.passed() {
        info!(
            script = %result.script_name,
            duration_ms = result.duration_ms,
            "collection script finished"
        );
    } else {
        warn!(
            event = "coverage.script_failed",
            script = %result.script_name,
            exit_code = result.exit_code,
            stderr = %tail(&result.stderr),
            "error executing collection script"
        );
    }
}

fn tail(text: &str) -> &str {
    if text.len() <= LOG_TAIL {
        return text;
    }
    let mut start = text.len() - LOG_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
