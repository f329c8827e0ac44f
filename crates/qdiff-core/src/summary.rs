//! Batch summary written after a run of matrix passes.
//!
//! Per-circuit outcomes are folded into [`BatchTotals`] and saved as pretty
//! JSON wherever the caller asks.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::Role;
use crate::matrix::{MatrixOutcome, MatrixStatus};

/// Totals across a batch of matrix passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTotals {
    pub circuits: usize,
    pub circuits_without_artifacts: usize,
    pub artifacts: usize,
    pub export_failures: usize,
    pub import_failures: usize,
    pub compare_failures: usize,
}

impl BatchTotals {
    pub fn from_outcomes(outcomes: &[MatrixOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut acc, o| {
            acc.circuits += 1;
            if o.status == MatrixStatus::NoArtifacts {
                acc.circuits_without_artifacts += 1;
            }
            acc.artifacts += o.artifacts.len();
            acc.export_failures += o.failures_in(Role::Export).count();
            acc.import_failures += o.failures_in(Role::Import).count();
            acc.compare_failures += o.failures_in(Role::Compare).count();
            acc
        })
    }

    pub fn total_failures(&self) -> usize {
        self.export_failures + self.import_failures + self.compare_failures
    }
}

/// Machine-readable summary of a matrix batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixSummaryArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub totals: BatchTotals,
    pub outcomes: Vec<MatrixOutcome>,
}

impl MatrixSummaryArtifact {
    pub fn new(outcomes: Vec<MatrixOutcome>) -> Self {
        Self {
            schema_version: "1.0".to_string(),
            generated_at: Utc::now(),
            totals: BatchTotals::from_outcomes(&outcomes),
            outcomes,
        }
    }
}

/// Write the summary in pretty JSON format.
pub fn write_summary_json(path: &Path, artifact: &MatrixSummaryArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize matrix summary")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
