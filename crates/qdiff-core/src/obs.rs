//! Structured observability hooks for matrix passes.
//!
//! This module provides:
//! - A circuit-scoped tracing span via `matrix_span`
//! - Emission functions for the lifecycle of a pass: start, export, stage
//!   failure, comparison, finish
//!
//! Events are emitted at `info!` level unless noted (filter with `RUST_LOG`).

use tracing::{info, warn};

use crate::capability::Role;

/// Span covering one matrix pass, tagged with the circuit name.
///
/// # Example
///
/// ```ignore
/// executor_pass().instrument(matrix_span("qc")).await;
/// // every tracing call inside now carries circuit = "qc"
/// ```
pub fn matrix_span(circuit_name: &str) -> tracing::Span {
    tracing::info_span!("qdiff.matrix", circuit = %circuit_name)
}

/// Emit event: matrix pass started with the registry shape.
pub fn emit_matrix_started(circuit: &str, exporters: usize, importers: usize, comparators: usize) {
    info!(
        event = "matrix.started",
        circuit = %circuit,
        exporters = exporters,
        importers = importers,
        comparators = comparators,
    );
}

/// Emit event: an exporter produced an artifact.
pub fn emit_artifact_exported(circuit: &str, exporter: &str, path: &std::path::Path) {
    info!(
        event = "matrix.artifact_exported",
        circuit = %circuit,
        exporter = %exporter,
        path = %path.display(),
    );
}

/// Emit event: no exporter succeeded, the circuit is skipped (warning level).
pub fn emit_no_artifacts(circuit: &str) {
    warn!(event = "matrix.no_artifacts", circuit = %circuit, "no artifacts produced");
}

/// Emit event: one step of a stage failed (warning level).
pub fn emit_stage_failed(stage: Role, circuit: &str, involved: &[String], message: &str) {
    warn!(
        event = "matrix.stage_failed",
        stage = %stage,
        circuit = %circuit,
        involved = ?involved,
        message = %message,
    );
}

/// Emit event: a comparator judged a pair equivalent.
pub fn emit_pair_equivalent(comparator: &str, a: &std::path::Path, b: &std::path::Path) {
    info!(
        event = "matrix.pair_equivalent",
        comparator = %comparator,
        a = %a.display(),
        b = %b.display(),
    );
}

/// Emit event: matrix pass finished.
pub fn emit_matrix_finished(circuit: &str, artifacts: usize, failures: usize, duration_ms: u64) {
    info!(
        event = "matrix.finished",
        circuit = %circuit,
        artifacts = artifacts,
        failures = failures,
        duration_ms = duration_ms,
    );
}
