//! Capability-matrix execution.
//!
//! One matrix pass per circuit runs three strictly sequential stages:
//!
//! ```text
//!   export (every exporter)
//!     ──→ import (importer × artifact)
//!     ──→ compare (pair × comparator)
//! ```
//!
//! Inside a stage the calls are independent and run on tokio's blocking pool,
//! bounded by [`MatrixConfig::max_concurrency`]. Every call sits behind its own
//! failure boundary: an error or a panic becomes a [`FailureRecord`] and the
//! stage carries on. Results are collected in invocation order, so artifacts
//! and records come out in registry order no matter how the pool schedules.
//!
//! The only early exit is an export stage that yields no artifacts.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, warn, Instrument};

use crate::artifact::{
    artifact_file_name, pairs, Artifact, ArtifactPair, NamedCircuit, DEFAULT_ARTIFACT_EXTENSION,
};
use crate::capability::{CapabilityId, ExportRequest, Role, Verdict};
use crate::obs;
use crate::registry::CapabilityRegistry;
use crate::report::{FailureRecord, FailureReporter};

/// Matrix executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Directory receiving suggested artifact paths and failure records.
    pub output_dir: PathBuf,
    /// Name of the program the circuits come from (e.g. `prog_0001.py`).
    pub source_identifier: String,
    /// Extension used for suggested artifact paths.
    pub artifact_extension: String,
    /// Upper bound on concurrent capability calls within a stage.
    pub max_concurrency: usize,
}

impl MatrixConfig {
    pub fn new(output_dir: impl Into<PathBuf>, source_identifier: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            source_identifier: source_identifier.into(),
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_string(),
            max_concurrency: default_concurrency(),
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_artifact_extension(mut self, extension: impl Into<String>) -> Self {
        self.artifact_extension = extension.into();
        self
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Terminal state of a matrix pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixStatus {
    /// All three stages ran (individual steps may still have failed).
    Completed,
    /// No exporter succeeded; import and compare were skipped.
    NoArtifacts,
}

/// A failure record together with where it was written, if anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedFailure {
    pub record: FailureRecord,
    pub path: Option<PathBuf>,
}

/// Result of one matrix pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixOutcome {
    pub circuit_name: String,
    pub status: MatrixStatus,
    pub artifacts: Vec<Artifact>,
    pub export_attempts: usize,
    pub import_attempts: usize,
    pub compare_invocations: usize,
    pub failures: Vec<ReportedFailure>,
    pub duration_ms: u64,
}

impl MatrixOutcome {
    fn new(circuit_name: &str) -> Self {
        Self {
            circuit_name: circuit_name.to_string(),
            status: MatrixStatus::Completed,
            artifacts: Vec::new(),
            export_attempts: 0,
            import_attempts: 0,
            compare_invocations: 0,
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Failures recorded during `stage`.
    pub fn failures_in(&self, stage: Role) -> impl Iterator<Item = &ReportedFailure> {
        self.failures
            .iter()
            .filter(move |f| f.record.stage == Some(stage))
    }

    /// Whether the pass completed without a single failure.
    pub fn is_clean(&self) -> bool {
        self.status == MatrixStatus::Completed && self.failures.is_empty()
    }
}

/// Outcome of one isolated capability call.
enum CallOutcome<T> {
    Ok(T),
    Failed { message: String, stack_trace: String },
}

impl<T> CallOutcome<T> {
    fn from_error(err: &anyhow::Error) -> Self {
        CallOutcome::Failed {
            message: format!("{err:#}"),
            stack_trace: format!("{err:?}"),
        }
    }

    fn from_join_error(err: JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            let message = panic_message(payload.as_ref());
            CallOutcome::Failed {
                message: format!("capability panicked: {message}"),
                stack_trace: format!("panic payload: {message}"),
            }
        } else {
            CallOutcome::Failed {
                message: "capability task was cancelled".to_string(),
                stack_trace: err.to_string(),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run blocking jobs with at most `limit` in flight; outcomes keep job order.
async fn run_isolated<T, F>(jobs: Vec<F>, limit: usize) -> Vec<CallOutcome<T>>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let sem = Arc::new(Semaphore::new(limit.max(1)));
    let mut handles = Vec::with_capacity(jobs.len());

    for job in jobs {
        let sem = Arc::clone(&sem);
        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            tokio::task::spawn_blocking(job).await
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = match handle.await {
            Ok(Ok(Ok(value))) => CallOutcome::Ok(value),
            Ok(Ok(Err(err))) => CallOutcome::from_error(&err),
            Ok(Err(join_err)) | Err(join_err) => CallOutcome::from_join_error(join_err),
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Runs the export → import → compare protocol over registered capabilities.
pub struct MatrixExecutor<C> {
    registry: CapabilityRegistry<C>,
    config: MatrixConfig,
    reporter: FailureReporter,
}

impl<C: Send + Sync + 'static> MatrixExecutor<C> {
    pub fn new(registry: CapabilityRegistry<C>, config: MatrixConfig) -> Self {
        let reporter =
            FailureReporter::new(config.output_dir.clone(), config.source_identifier.clone());
        Self {
            registry,
            config,
            reporter,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry<C> {
        &self.registry
    }

    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    /// Run one matrix pass. Never fails: every capability fault is recorded
    /// in the returned outcome and on disk.
    pub async fn run(&self, circuit: &NamedCircuit<C>) -> MatrixOutcome {
        self.run_pass(circuit)
            .instrument(obs::matrix_span(&circuit.name))
            .await
    }

    /// Run one pass per circuit, in the given order. A circuit that yields no
    /// artifacts does not stop the batch.
    pub async fn run_batch(&self, circuits: &[NamedCircuit<C>]) -> Vec<MatrixOutcome> {
        let mut outcomes = Vec::with_capacity(circuits.len());
        for circuit in circuits {
            outcomes.push(self.run(circuit).await);
        }
        outcomes
    }

    async fn run_pass(&self, circuit: &NamedCircuit<C>) -> MatrixOutcome {
        let started = Instant::now();
        obs::emit_matrix_started(
            &circuit.name,
            self.registry.exporters().len(),
            self.registry.importers().len(),
            self.registry.comparators().len(),
        );

        if let Err(e) = std::fs::create_dir_all(&self.config.output_dir) {
            warn!(
                output_dir = %self.config.output_dir.display(),
                error = %e,
                "could not create output directory"
            );
        }

        let mut outcome = MatrixOutcome::new(&circuit.name);
        self.export_stage(circuit, &mut outcome).await;

        if outcome.artifacts.is_empty() {
            obs::emit_no_artifacts(&circuit.name);
            outcome.status = MatrixStatus::NoArtifacts;
        } else {
            self.import_stage(&mut outcome).await;
            self.compare_stage(&mut outcome).await;
        }

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_matrix_finished(
            &circuit.name,
            outcome.artifacts.len(),
            outcome.failures.len(),
            outcome.duration_ms,
        );
        outcome
    }

    async fn export_stage(&self, circuit: &NamedCircuit<C>, outcome: &mut MatrixOutcome) {
        let exporters = self.registry.exporters();
        let stem = self.reporter.source_stem().to_string();

        let jobs: Vec<_> = exporters
            .iter()
            .map(|exporter| {
                let exporter = Arc::clone(exporter);
                let shared = Arc::clone(&circuit.circuit);
                let backend = CapabilityId::new(exporter.name()).backend().to_string();
                let request = ExportRequest {
                    circuit_name: circuit.name.clone(),
                    suggested_path: self.config.output_dir.join(artifact_file_name(
                        &stem,
                        &circuit.name,
                        &backend,
                        &self.config.artifact_extension,
                    )),
                };
                move || exporter.export(&*shared, &request)
            })
            .collect();
        outcome.export_attempts = jobs.len();

        let results = run_isolated(jobs, self.config.max_concurrency).await;
        for (exporter, result) in exporters.iter().zip(results) {
            let id = CapabilityId::new(exporter.name());
            match result {
                CallOutcome::Ok(path) => {
                    obs::emit_artifact_exported(&circuit.name, id.as_str(), &path);
                    outcome.artifacts.push(Artifact {
                        path,
                        producer: id,
                        circuit_name: circuit.name.clone(),
                    });
                }
                CallOutcome::Failed {
                    message,
                    stack_trace,
                } => self.record_failure(outcome, Role::Export, &[id], message, stack_trace),
            }
        }
    }

    async fn import_stage(&self, outcome: &mut MatrixOutcome) {
        let mut involved = Vec::new();
        let mut jobs = Vec::new();
        for importer in self.registry.importers() {
            for artifact in &outcome.artifacts {
                involved.push([
                    CapabilityId::new(importer.name()),
                    artifact.producer.clone(),
                ]);
                let importer = Arc::clone(importer);
                let path = artifact.path.clone();
                jobs.push(move || importer.import(&path));
            }
        }
        outcome.import_attempts = jobs.len();

        let results = run_isolated(jobs, self.config.max_concurrency).await;
        for (ids, result) in involved.into_iter().zip(results) {
            match result {
                CallOutcome::Ok(()) => {
                    debug!(importer = %ids[0], exporter = %ids[1], "artifact imported");
                }
                CallOutcome::Failed {
                    message,
                    stack_trace,
                } => self.record_failure(outcome, Role::Import, &ids, message, stack_trace),
            }
        }
    }

    async fn compare_stage(&self, outcome: &mut MatrixOutcome) {
        let mut steps = Vec::new();
        let mut jobs = Vec::new();
        for ArtifactPair { first: a, second: b } in pairs(&outcome.artifacts) {
            for comparator in self.registry.comparators() {
                steps.push((
                    [
                        CapabilityId::new(comparator.name()),
                        a.producer.clone(),
                        b.producer.clone(),
                    ],
                    a.path.clone(),
                    b.path.clone(),
                ));
                let comparator = Arc::clone(comparator);
                let (path_a, path_b) = (a.path.clone(), b.path.clone());
                jobs.push(move || comparator.compare(&path_a, &path_b));
            }
        }
        outcome.compare_invocations = jobs.len();

        let results = run_isolated(jobs, self.config.max_concurrency).await;
        for ((ids, path_a, path_b), result) in steps.into_iter().zip(results) {
            match result {
                CallOutcome::Ok(Verdict::Equivalent) => {
                    obs::emit_pair_equivalent(ids[0].as_str(), &path_a, &path_b);
                }
                CallOutcome::Ok(Verdict::NotEquivalent { reason }) => {
                    let trace = format!(
                        "{} judged {} and {} not equivalent",
                        ids[0],
                        path_a.display(),
                        path_b.display()
                    );
                    self.record_failure(outcome, Role::Compare, &ids, reason, trace);
                }
                CallOutcome::Failed {
                    message,
                    stack_trace,
                } => self.record_failure(outcome, Role::Compare, &ids, message, stack_trace),
            }
        }
    }

    fn record_failure(
        &self,
        outcome: &mut MatrixOutcome,
        stage: Role,
        involved: &[CapabilityId],
        message: String,
        stack_trace: String,
    ) {
        let record = FailureRecord::new(
            message,
            stack_trace,
            self.reporter.source_identifier(),
            involved,
        )
        .with_stage(stage)
        .with_circuit(outcome.circuit_name.clone());
        obs::emit_stage_failed(
            stage,
            &outcome.circuit_name,
            &record.involved_capabilities,
            &record.exception_message,
        );
        let path = self.reporter.persist(&record);
        outcome.failures.push(ReportedFailure { record, path });
    }
}
