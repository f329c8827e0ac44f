//! Structured failure records.
//!
//! Every failed matrix step becomes one JSON file named
//! `<source-stem>_<random6>_error.json`. Writing is best-effort: the
//! reporter logs and swallows its own I/O faults so a broken output
//! directory never takes down a matrix pass.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::capability::{CapabilityId, Role};
use crate::error::{DiffError, Result};

const SUFFIX_LEN: usize = 6;
const MAX_NAME_ATTEMPTS: usize = 8;

/// One failed step of a matrix pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub exception_message: String,
    pub stack_trace: String,
    pub source_identifier: String,
    /// Capabilities invoked in the failing step, handler first.
    pub involved_capabilities: Vec<String>,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_name: Option<String>,
}

impl FailureRecord {
    pub fn new(
        exception_message: impl Into<String>,
        stack_trace: impl Into<String>,
        source_identifier: impl Into<String>,
        involved: &[CapabilityId],
    ) -> Self {
        Self {
            exception_message: exception_message.into(),
            stack_trace: stack_trace.into(),
            source_identifier: source_identifier.into(),
            involved_capabilities: involved.iter().map(|id| id.to_string()).collect(),
            timestamp: Some(unix_now()),
            stage: None,
            circuit_name: None,
        }
    }

    pub fn with_stage(mut self, stage: Role) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_circuit(mut self, circuit_name: impl Into<String>) -> Self {
        self.circuit_name = Some(circuit_name.into());
        self
    }
}

fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// `<source-stem>_<suffix>_error.json`
pub fn failure_file_name(source_stem: &str, suffix: &str) -> String {
    format!("{source_stem}_{suffix}_error.json")
}

fn random_suffix() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(SUFFIX_LEN);
    id
}

/// Persists [`FailureRecord`]s next to the artifacts of the running source.
#[derive(Debug, Clone)]
pub struct FailureReporter {
    output_dir: PathBuf,
    source_identifier: String,
}

impl FailureReporter {
    pub fn new(output_dir: impl Into<PathBuf>, source_identifier: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            source_identifier: source_identifier.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn source_identifier(&self) -> &str {
        &self.source_identifier
    }

    /// File stem of the source identifier (`prog.py` → `prog`).
    pub fn source_stem(&self) -> &str {
        Path::new(&self.source_identifier)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.source_identifier)
    }

    /// Build and persist a record for `error`. Never fails; returns the
    /// written path, or `None` when persisting was not possible.
    pub fn report(
        &self,
        error: &dyn std::fmt::Display,
        stack_trace: &str,
        involved: &[CapabilityId],
    ) -> Option<PathBuf> {
        let record = FailureRecord::new(
            error.to_string(),
            stack_trace,
            self.source_identifier.clone(),
            involved,
        );
        self.persist(&record)
    }

    /// Persist a prepared record. Never fails; see [`FailureReporter::report`].
    pub fn persist(&self, record: &FailureRecord) -> Option<PathBuf> {
        match self.try_persist(record) {
            Ok(path) => {
                info!(path = %path.display(), "failure record saved");
                Some(path)
            }
            Err(e) => {
                warn!(
                    event = "report.write_failed",
                    error = %e,
                    involved = ?record.involved_capabilities,
                    "could not persist failure record"
                );
                None
            }
        }
    }

    fn try_persist(&self, record: &FailureRecord) -> Result<PathBuf> {
        if record.involved_capabilities.is_empty() {
            return Err(DiffError::NoInvolvedCapabilities);
        }
        fs::create_dir_all(&self.output_dir)?;
        let body = serde_json::to_vec_pretty(record)?;

        let mut last_err = None;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self
                .output_dir
                .join(failure_file_name(self.source_stem(), &random_suffix()));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&body)?;
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last_err = Some(e),
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::AlreadyExists, "name collision"))
            .into())
    }
}
