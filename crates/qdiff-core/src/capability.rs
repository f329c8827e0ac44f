//! Capability roles and the handler traits conversion backends implement.
//!
//! A backend participates in a matrix pass by registering one handler per
//! role it supports:
//!
//! | Role | Trait | Input | Output |
//! |------|-------|-------|--------|
//! | `Export` | [`Exporter`] | circuit + [`ExportRequest`] | artifact path |
//! | `Import` | [`Importer`] | artifact path | success / failure |
//! | `Compare` | [`Comparator`] | two artifact paths | [`Verdict`] |
//!
//! Handlers are synchronous: backend calls are assumed to block. The matrix
//! executor moves them onto a bounded blocking pool.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The three capability classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Export,
    Import,
    Compare,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Export, Role::Import, Role::Compare];

    /// Canonical identifier prefix for capabilities of this role.
    pub fn prefix(&self) -> &'static str {
        match self {
            Role::Export => "export_to_qasm_with_",
            Role::Import => "import_from_qasm_with_",
            Role::Compare => "compare_qasm_",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Export => "export",
            Role::Import => "import",
            Role::Compare => "compare",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a registered capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(String);

impl CapabilityId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backend label used in artifact file names.
    ///
    /// Strips a canonical role prefix when present, so
    /// `export_to_qasm_with_pytket` becomes `pytket`; other names are used
    /// verbatim.
    pub fn backend(&self) -> &str {
        Role::ALL
            .iter()
            .find_map(|role| self.0.strip_prefix(role.prefix()))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CapabilityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Parameters handed to an exporter alongside the circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Binding name of the circuit, used to correlate artifacts.
    pub circuit_name: String,
    /// Where the executor expects the artifact to land. Exporters may
    /// write elsewhere and return that path instead.
    pub suggested_path: PathBuf,
}

/// Result of an equivalence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Equivalent,
    NotEquivalent { reason: String },
}

impl Verdict {
    pub fn not_equivalent(reason: impl Into<String>) -> Self {
        Verdict::NotEquivalent {
            reason: reason.into(),
        }
    }

    pub fn is_equivalent(&self) -> bool {
        matches!(self, Verdict::Equivalent)
    }
}

/// Serializes a circuit into a backend's artifact format.
pub trait Exporter<C>: Send + Sync {
    fn name(&self) -> &str;

    fn export(&self, circuit: &C, request: &ExportRequest) -> anyhow::Result<PathBuf>;
}

/// Loads an artifact back. The parsed value is discarded; only success matters.
pub trait Importer: Send + Sync {
    fn name(&self) -> &str;

    fn import(&self, artifact: &Path) -> anyhow::Result<()>;
}

/// Checks two artifacts for equivalence.
pub trait Comparator: Send + Sync {
    fn name(&self) -> &str;

    fn compare(&self, a: &Path, b: &Path) -> anyhow::Result<Verdict>;
}

/// Closure-backed exporter.
pub struct FnExporter<F> {
    name: String,
    f: F,
}

impl<F> FnExporter<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<C, F> Exporter<C> for FnExporter<F>
where
    F: Fn(&C, &ExportRequest) -> anyhow::Result<PathBuf> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn export(&self, circuit: &C, request: &ExportRequest) -> anyhow::Result<PathBuf> {
        (self.f)(circuit, request)
    }
}

/// Closure-backed importer.
pub struct FnImporter<F> {
    name: String,
    f: F,
}

impl<F> FnImporter<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Importer for FnImporter<F>
where
    F: Fn(&Path) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn import(&self, artifact: &Path) -> anyhow::Result<()> {
        (self.f)(artifact)
    }
}

/// Closure-backed comparator.
pub struct FnComparator<F> {
    name: String,
    f: F,
}

impl<F> FnComparator<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Comparator for FnComparator<F>
where
    F: Fn(&Path, &Path) -> anyhow::Result<Verdict> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn compare(&self, a: &Path, b: &Path) -> anyhow::Result<Verdict> {
        (self.f)(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_prefixes_are_distinct() {
        assert_eq!(Role::Export.prefix(), "export_to_qasm_with_");
        assert_eq!(Role::Import.prefix(), "import_from_qasm_with_");
        assert_eq!(Role::Compare.prefix(), "compare_qasm_");
    }

    #[test]
    fn test_backend_strips_role_prefix() {
        assert_eq!(CapabilityId::from("export_to_qasm_with_pytket").backend(), "pytket");
        assert_eq!(CapabilityId::from("compare_qasm_via_qcec").backend(), "via_qcec");
        assert_eq!(CapabilityId::from("A").backend(), "A");
        assert_eq!(
            CapabilityId::from("export_to_qasm_with_").backend(),
            "export_to_qasm_with_"
        );
    }

    #[test]
    fn test_verdict_serializes_tagged() {
        let raw = serde_json::to_value(Verdict::not_equivalent("phase differs"))
            .expect("serialize verdict");
        assert_eq!(raw["verdict"], "not_equivalent");
        assert_eq!(raw["reason"], "phase differs");
        assert!(Verdict::Equivalent.is_equivalent());
    }

    #[test]
    fn test_fn_comparator_delegates() {
        let cmp = FnComparator::new(
            "always_equal",
            |_: &Path, _: &Path| -> anyhow::Result<Verdict> { Ok(Verdict::Equivalent) },
        );
        assert_eq!(cmp.name(), "always_equal");
        let verdict = cmp
            .compare(Path::new("a.qasm"), Path::new("b.qasm"))
            .expect("compare");
        assert!(verdict.is_equivalent());
    }
}
