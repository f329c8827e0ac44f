//! Error taxonomy for the differential-execution engine.
//!
//! Capability handlers report their own failures through `anyhow::Error`;
//! those never surface here. [`DiffError`] only covers misuse of the engine
//! itself: bad registrations, malformed manifests and persistence faults.

use std::path::PathBuf;

/// Errors produced by the registry, reporter and manifest loader.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("duplicate capability registration: {0}")]
    DuplicateCapability(String),

    #[error("exporter '{capability}' shares backend label '{backend}' with '{existing}'")]
    DuplicateBackend {
        capability: String,
        existing: String,
        backend: String,
    },

    #[error("capability name must not be empty")]
    EmptyCapabilityName,

    #[error("failure record must name at least one capability")]
    NoInvolvedCapabilities,

    #[error("command template for capability '{0}' is empty")]
    EmptyCommand(String),

    #[error("invalid manifest {path:?}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, DiffError>;
