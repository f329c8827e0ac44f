//! Configuration and I/O errors of the coverage orchestrator.
//!
//! Script failures are not errors: they are recorded in the collection report
//! and the batch carries on.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    #[error("scripts directory not configured (set {0})")]
    ScriptsDirNotConfigured(&'static str),

    #[error("scripts directory {0:?} does not exist or is not a directory")]
    ScriptsDirNotFound(PathBuf),

    #[error("working folder {0:?} is not a valid directory")]
    InvalidWorkingFolder(PathBuf),

    #[error("result folder {0:?} already exists")]
    ResultFolderExists(PathBuf),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoverageError>;
