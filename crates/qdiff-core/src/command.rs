//! Capabilities backed by external commands.
//!
//! Lets conversion toolchains written in any language take part in a matrix
//! pass. Each capability is an argv template; placeholders are substituted
//! before the command runs:
//!
//! | Role | Placeholders |
//! |------|--------------|
//! | export | `{circuit}`, `{name}`, `{output}` |
//! | import | `{artifact}` |
//! | compare | `{a}`, `{b}` |
//!
//! Exit status 0 means success. Comparators follow the `cmp(1)` convention:
//! 0 is equivalent, 1 is not equivalent, anything else is an error.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};

use crate::capability::{Comparator, ExportRequest, Exporter, Importer, Verdict};
use crate::error::{DiffError, Result};
use crate::registry::CapabilityRegistry;

const STDERR_TAIL: usize = 2_000;

/// A named argv template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub name: String,
    pub argv: Vec<String>,
}

impl CommandTemplate {
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            argv,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DiffError::EmptyCapabilityName);
        }
        if self.argv.is_empty() || self.argv[0].is_empty() {
            return Err(DiffError::EmptyCommand(self.name.clone()));
        }
        Ok(())
    }

    /// Substitute `{key}` placeholders in every argument.
    pub fn render(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.argv
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{key}}}"), value)
                })
            })
            .collect()
    }

    fn run(&self, vars: &[(&str, &str)]) -> anyhow::Result<Output> {
        let argv = self.render(vars);
        let (exe, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("capability {} has an empty command", self.name))?;
        Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to spawn '{}' for capability {}", exe, self.name))
    }
}

fn describe_exit(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let tail_start = stderr
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let code = output
        .status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    if stderr.is_empty() {
        format!("exit status {code}")
    } else {
        format!("exit status {code}: {}", &stderr[tail_start..])
    }
}

/// Exporter running `argv` with `{circuit}`, `{name}` and `{output}`.
///
/// The circuit type must expose a path to its source.
#[derive(Debug, Clone)]
pub struct CommandExporter {
    template: CommandTemplate,
}

impl CommandExporter {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

impl<C: AsRef<Path>> Exporter<C> for CommandExporter {
    fn name(&self) -> &str {
        &self.template.name
    }

    fn export(&self, circuit: &C, request: &ExportRequest) -> anyhow::Result<PathBuf> {
        let circuit = circuit.as_ref().to_string_lossy();
        let output_path = request.suggested_path.to_string_lossy();
        let output = self.template.run(&[
            ("circuit", &*circuit),
            ("name", request.circuit_name.as_str()),
            ("output", &*output_path),
        ])?;
        if !output.status.success() {
            bail!("{} failed: {}", self.template.name, describe_exit(&output));
        }
        if !request.suggested_path.is_file() {
            bail!(
                "{} exited successfully but wrote no artifact at {}",
                self.template.name,
                request.suggested_path.display()
            );
        }
        Ok(request.suggested_path.clone())
    }
}

/// Importer running `argv` with `{artifact}`.
#[derive(Debug, Clone)]
pub struct CommandImporter {
    template: CommandTemplate,
}

impl CommandImporter {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

impl Importer for CommandImporter {
    fn name(&self) -> &str {
        &self.template.name
    }

    fn import(&self, artifact: &Path) -> anyhow::Result<()> {
        let artifact = artifact.to_string_lossy();
        let output = self.template.run(&[("artifact", &*artifact)])?;
        if !output.status.success() {
            bail!("{} failed: {}", self.template.name, describe_exit(&output));
        }
        Ok(())
    }
}

/// Comparator running `argv` with `{a}` and `{b}`.
#[derive(Debug, Clone)]
pub struct CommandComparator {
    template: CommandTemplate,
}

impl CommandComparator {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

impl Comparator for CommandComparator {
    fn name(&self) -> &str {
        &self.template.name
    }

    fn compare(&self, a: &Path, b: &Path) -> anyhow::Result<Verdict> {
        let (a_str, b_str) = (a.to_string_lossy(), b.to_string_lossy());
        let output = self.template.run(&[("a", &*a_str), ("b", &*b_str)])?;
        match output.status.code() {
            Some(0) => Ok(Verdict::Equivalent),
            Some(1) => Ok(Verdict::not_equivalent(format!(
                "the circuits are not equivalent: {}, {}",
                a.display(),
                b.display()
            ))),
            _ => bail!("{} failed: {}", self.template.name, describe_exit(&output)),
        }
    }
}

/// Command capabilities grouped by role, as read from a JSON manifest.
///
/// ```json
/// {
///   "exporters": [{
///     "name": "export_to_qasm_with_qiskit",
///     "argv": ["python", "qiskit_export.py", "{circuit}", "{output}"]
///   }],
///   "importers": [{
///     "name": "import_from_qasm_with_pytket",
///     "argv": ["python", "pytket_import.py", "{artifact}"]
///   }],
///   "comparators": [{
///     "name": "compare_qasm_via_qcec",
///     "argv": ["python", "qcec_check.py", "{a}", "{b}"]
///   }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixManifest {
    #[serde(default)]
    pub exporters: Vec<CommandTemplate>,
    #[serde(default)]
    pub importers: Vec<CommandTemplate>,
    #[serde(default)]
    pub comparators: Vec<CommandTemplate>,
}

impl MatrixManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| DiffError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Register every command in manifest order.
    pub fn into_registry<C>(self) -> Result<CapabilityRegistry<C>>
    where
        C: AsRef<Path> + 'static,
    {
        let mut registry = CapabilityRegistry::new();
        for template in self.exporters {
            template.validate()?;
            registry.register_exporter(CommandExporter::new(template))?;
        }
        for template in self.importers {
            template.validate()?;
            registry.register_importer(CommandImporter::new(template))?;
        }
        for template in self.comparators {
            template.validate()?;
            registry.register_comparator(CommandComparator::new(template))?;
        }
        Ok(registry)
    }
}
