//! qdiff Core Library
//!
//! Differential execution of circuit conversion backends: every registered
//! exporter serializes the same circuit, every importer re-reads every
//! artifact, and every comparator checks every pair of artifacts. Each failed
//! step leaves a JSON failure record naming the capabilities involved.

pub mod artifact;
pub mod capability;
pub mod command;
pub mod error;
pub mod matrix;
pub mod obs;
pub mod registry;
pub mod report;
pub mod summary;
pub mod telemetry;

pub use artifact::{artifact_file_name, pairs, Artifact, ArtifactPair, NamedCircuit};
pub use capability::{
    CapabilityId, Comparator, ExportRequest, Exporter, FnComparator, FnExporter, FnImporter,
    Importer, Role, Verdict,
};
pub use command::{
    CommandComparator, CommandExporter, CommandImporter, CommandTemplate, MatrixManifest,
};
pub use error::{DiffError, Result};
pub use matrix::{MatrixConfig, MatrixExecutor, MatrixOutcome, MatrixStatus, ReportedFailure};
pub use registry::CapabilityRegistry;
pub use report::{failure_file_name, FailureRecord, FailureReporter};
pub use summary::{write_summary_json, BatchTotals, MatrixSummaryArtifact};
pub use telemetry::{init_tracing, init_tracing_with, LogFormat};

/// qdiff version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
