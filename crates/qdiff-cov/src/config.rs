//! Collector configuration.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};
use crate::followup::FollowUpCommand;

/// Environment variable naming the directory with the collection scripts.
pub const SCRIPTS_DIR_ENV: &str = "FOLDER_WITH_COVERAGE_COLLECTION_SCRIPTS";

/// Environment variable holding the follow-up command template.
pub const FOLLOWUP_ENV: &str = "QDIFF_FOLLOWUP_COMMAND";

pub const DEFAULT_SCRIPT_PREFIX: &str = "collect_";
pub const DEFAULT_SCRIPT_EXTENSION: &str = "sh";
pub const DEFAULT_INTERPRETER: &str = "bash";
pub const DEFAULT_ARTIFACT_EXTENSION: &str = "xml";

/// Everything one coverage collection pass needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Folder the scripts inspect and write their reports into.
    pub working_folder: PathBuf,

    /// Root under which numbered result folders are allocated.
    pub output_root: PathBuf,

    /// Directory holding the collection scripts.
    pub scripts_dir: Option<PathBuf>,

    /// Script file name prefix.
    pub script_prefix: String,

    /// Script file extension, without the dot.
    pub script_extension: String,

    /// Program each script is handed to.
    pub interpreter: String,

    /// Extension of the report files moved into the result folder.
    pub artifact_extension: String,

    /// Wall-clock deadline for the whole campaign.
    pub end_timestamp: Option<DateTime<Utc>>,

    /// Command launched detached on every new result folder.
    pub followup: Option<FollowUpCommand>,
}

impl CollectorConfig {
    pub fn new(working_folder: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            working_folder: working_folder.into(),
            output_root: output_root.into(),
            scripts_dir: None,
            script_prefix: DEFAULT_SCRIPT_PREFIX.to_string(),
            script_extension: DEFAULT_SCRIPT_EXTENSION.to_string(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_string(),
            end_timestamp: None,
            followup: None,
        }
    }

    /// Build a config taking the scripts directory and follow-up command
    /// from the environment.
    pub fn from_env(working_folder: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(working_folder, output_root);
        config.scripts_dir = non_empty_env(SCRIPTS_DIR_ENV).map(PathBuf::from);
        config.followup = non_empty_env(FOLLOWUP_ENV).and_then(|t| FollowUpCommand::parse(&t));
        config
    }

    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = Some(dir.into());
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_artifact_extension(mut self, extension: impl Into<String>) -> Self {
        self.artifact_extension = extension.into();
        self
    }

    pub fn with_end_timestamp(mut self, deadline: DateTime<Utc>) -> Self {
        self.end_timestamp = Some(deadline);
        self
    }

    /// Deadline given as unix seconds. Out-of-range values are ignored.
    pub fn with_end_timestamp_secs(mut self, secs: i64) -> Self {
        self.end_timestamp = Utc.timestamp_opt(secs, 0).single();
        self
    }

    pub fn with_followup(mut self, followup: FollowUpCommand) -> Self {
        self.followup = Some(followup);
        self
    }

    /// The configured scripts directory, or
    /// [`CoverageError::ScriptsDirNotConfigured`].
    pub fn scripts_dir(&self) -> Result<&Path> {
        self.scripts_dir
            .as_deref()
            .ok_or(CoverageError::ScriptsDirNotConfigured(SCRIPTS_DIR_ENV))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
