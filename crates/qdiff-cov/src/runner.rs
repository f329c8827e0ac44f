//! Collection script execution.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::script::CollectionScript;

/// Result of one script execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptResult {
    /// Script file name.
    pub script_name: String,

    /// Exit code (0 = success, -1 = no code, e.g. killed by a signal or never started).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl ScriptResult {
    /// Whether this script passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Result for a script that could not be started at all.
    pub fn spawn_failed(script_name: &str, error: &anyhow::Error) -> Self {
        Self {
            script_name: script_name.to_string(),
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("{error:#}"),
            duration_ms: 0,
            success: false,
        }
    }
}

/// Runs collection scripts as `<interpreter> <script> <working_folder>`.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: String,
}

impl ScriptRunner {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Execute a single script and wait for it. A non-zero exit is a
    /// successful call with `success = false`; only a spawn failure errors.
    pub async fn execute(
        &self,
        script: &CollectionScript,
        working_folder: &Path,
    ) -> anyhow::Result<ScriptResult> {
        let start = Instant::now();

        let child = Command::new(&self.interpreter)
            .arg(&script.path)
            .arg(working_folder)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                anyhow::anyhow!(
                    "failed to start {} {}: {e}",
                    self.interpreter,
                    script.path.display()
                )
            })?;
        let output = child.wait_with_output().await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);

        Ok(ScriptResult {
            script_name: script.name.clone(),
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            success: output.status.success(),
        })
    }
}
