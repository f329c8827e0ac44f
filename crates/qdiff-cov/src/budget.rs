//! Wall-clock budget for a coverage campaign.
//!
//! Exceeding the deadline leaves a `.timeout` sentinel in the working folder.
//! Every later invocation sees it and does nothing. Nothing here ever
//! deletes the sentinel; resetting a campaign means removing it by hand.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

pub const SENTINEL_FILE_NAME: &str = ".timeout";

/// The `.timeout` marker of one working folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel {
    path: PathBuf,
}

impl Sentinel {
    pub fn in_folder(working_folder: &Path) -> Self {
        Self {
            path: working_folder.join(SENTINEL_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_present(&self) -> bool {
        self.path.exists()
    }

    pub fn write(&self, diagnostic: &str) -> Result<()> {
        fs::write(&self.path, diagnostic)?;
        Ok(())
    }

    /// Text stored in the sentinel, `None` when absent or unreadable.
    pub fn diagnostic(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "sentinel unreadable");
                None
            }
        }
    }
}

/// Whether a campaign may run another pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum BudgetDecision {
    Continue,
    Halt { diagnostic: String },
}

impl BudgetDecision {
    pub fn is_halt(&self) -> bool {
        matches!(self, BudgetDecision::Halt { .. })
    }
}

/// `Time limit exceeded: <now> > <deadline>`, both as unix seconds.
pub fn exceeded_diagnostic(now: DateTime<Utc>, deadline: DateTime<Utc>) -> String {
    format!(
        "Time limit exceeded: {:.6} > {}",
        now.timestamp_micros() as f64 / 1_000_000.0,
        deadline.timestamp()
    )
}

/// Entry and post-pass checks of one working folder against its deadline.
#[derive(Debug, Clone)]
pub struct RunBudgeter {
    sentinel: Sentinel,
    end_timestamp: Option<DateTime<Utc>>,
}

impl RunBudgeter {
    pub fn new(working_folder: &Path, end_timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            sentinel: Sentinel::in_folder(working_folder),
            end_timestamp,
        }
    }

    pub fn sentinel(&self) -> &Sentinel {
        &self.sentinel
    }

    pub fn end_timestamp(&self) -> Option<DateTime<Utc>> {
        self.end_timestamp
    }

    /// Halt when a previous pass left the sentinel. The deadline alone never
    /// halts at entry: one pass always runs.
    pub fn check_entry(&self) -> BudgetDecision {
        if !self.sentinel.is_present() {
            return BudgetDecision::Continue;
        }
        let diagnostic = self
            .sentinel
            .diagnostic()
            .unwrap_or_else(|| "timeout sentinel present".to_string());
        info!(
            event = "budget.sentinel_found",
            path = %self.sentinel.path().display(),
            "timeout file found, exiting"
        );
        BudgetDecision::Halt { diagnostic }
    }

    /// Write the sentinel and halt when `now` is past the deadline.
    pub fn check_after_pass(&self, now: DateTime<Utc>) -> Result<BudgetDecision> {
        match self.end_timestamp {
            Some(deadline) if now > deadline => {
                let diagnostic = exceeded_diagnostic(now, deadline);
                self.sentinel.write(&diagnostic)?;
                warn!(
                    event = "budget.exceeded",
                    deadline = %deadline,
                    path = %self.sentinel.path().display(),
                    "current time exceeds end timestamp"
                );
                Ok(BudgetDecision::Halt { diagnostic })
            }
            _ => Ok(BudgetDecision::Continue),
        }
    }
}

/// Post-pass check through [`RunBudgeter`]: true when the sentinel exists,
/// or when the deadline has passed, in which case the sentinel is written
/// first. A sentinel that cannot be written is logged and still stops.
pub fn should_stop(working_folder: &Path, end_timestamp: Option<DateTime<Utc>>) -> bool {
    let budgeter = RunBudgeter::new(working_folder, end_timestamp);
    if budgeter.check_entry().is_halt() {
        return true;
    }
    match budgeter.check_after_pass(Utc::now()) {
        Ok(decision) => decision.is_halt(),
        Err(e) => {
            warn!(
                path = %budgeter.sentinel().path().display(),
                error = %e,
                "failed to write timeout sentinel"
            );
            true
        }
    }
}

/// Write the sentinel with `reason`.
pub fn mark_exceeded(working_folder: &Path, reason: &str) -> Result<()> {
    Sentinel::in_folder(working_folder).write(reason)
}
