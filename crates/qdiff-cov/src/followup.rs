//! Detached follow-up processing of a fresh result folder.
//!
//! The child is spawned and its handle dropped: nobody waits for it, nobody
//! kills it, and its output goes nowhere.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::info;

/// Placeholder replaced by the result folder path.
pub const FOLDER_PLACEHOLDER: &str = "{folder}";

/// Argv template for the follow-up, e.g.
/// `python -m qite.compute_coverage --folder_path {folder}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpCommand {
    argv: Vec<String>,
}

impl FollowUpCommand {
    pub fn new(argv: Vec<String>) -> Option<Self> {
        if argv.is_empty() {
            None
        } else {
            Some(Self { argv })
        }
    }

    /// Split a whitespace-separated template. Single or double quotes group
    /// an argument that contains spaces; there are no escapes. Returns `None`
    /// for a blank template.
    pub fn parse(template: &str) -> Option<Self> {
        Self::new(split_template(template))
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Substitute the folder. Without any placeholder the folder is appended
    /// as the last argument.
    pub fn render(&self, folder: &Path) -> Vec<String> {
        let folder = folder.display().to_string();
        let mut argv: Vec<String> = self
            .argv
            .iter()
            .map(|arg| arg.replace(FOLDER_PLACEHOLDER, &folder))
            .collect();
        if !self.argv.iter().any(|arg| arg.contains(FOLDER_PLACEHOLDER)) {
            argv.push(folder);
        }
        argv
    }

    /// Launch without waiting. Returns the child's pid when the OS reports one.
    pub fn spawn_detached(&self, folder: &Path) -> std::io::Result<Option<u32>> {
        let argv = self.render(folder);
        let Some((program, args)) = argv.split_first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty follow-up command",
            ));
        };
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let pid = child.id();
        info!(
            event = "coverage.followup_spawned",
            folder = %folder.display(),
            pid = ?pid,
            command = %argv.join(" "),
        );
        drop(child);
        Ok(pid)
    }
}

fn split_template(template: &str) -> Vec<String> {
    let mut argv = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;
    for c in template.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_arg = true;
            }
            None if c.is_whitespace() => {
                if in_arg {
                    argv.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            None => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_arg {
        argv.push(current);
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blank_is_none() {
        assert!(FollowUpCommand::parse("   ").is_none());
    }

    #[test]
    fn test_render_substitutes_placeholder() {
        let cmd = FollowUpCommand::parse("python -m qite.compute_coverage --folder_path {folder}")
            .expect("template");
        assert_eq!(
            cmd.render(Path::new("/out/0003")),
            vec![
                "python",
                "-m",
                "qite.compute_coverage",
                "--folder_path",
                "/out/0003"
            ]
        );
    }

    #[test]
    fn test_parse_keeps_quoted_path_together() {
        let cmd = FollowUpCommand::parse(
            r#"python "/opt/qite tools/compute coverage.py" --folder_path '{folder}' ''"#,
        )
        .expect("template");
        assert_eq!(
            cmd.argv(),
            ["python", "/opt/qite tools/compute coverage.py", "--folder_path", "{folder}", ""]
        );
        assert_eq!(
            cmd.render(Path::new("/runs/cov out/0004"))[3],
            "/runs/cov out/0004"
        );
    }

    #[test]
    fn test_render_appends_without_placeholder() {
        let cmd = FollowUpCommand::parse("compute-coverage").expect("template");
        assert_eq!(
            cmd.render(Path::new("/out/0001")),
            vec!["compute-coverage", "/out/0001"]
        );
    }

    #[tokio::test]
    async fn test_spawn_detached_returns_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("done");
        let cmd = FollowUpCommand::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("sleep 2; touch {}", marker.display()),
        ])
        .expect("argv");

        let pid = cmd.spawn_detached(dir.path()).expect("spawn");
        assert!(pid.is_some());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let cmd = FollowUpCommand::parse("/nonexistent/qdiff-followup {folder}").expect("template");
        assert!(cmd.spawn_detached(Path::new("/tmp")).is_err());
    }
}
