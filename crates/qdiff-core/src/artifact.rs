//! Artifacts produced by exporters and the pairing used by comparators.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityId;

/// Default extension for exported artifacts.
pub const DEFAULT_ARTIFACT_EXTENSION: &str = "qasm";

/// A circuit handed to the matrix executor together with its binding name.
///
/// The executor never looks inside `circuit`; it only shares it with
/// exporters.
#[derive(Debug)]
pub struct NamedCircuit<C> {
    pub name: String,
    pub circuit: Arc<C>,
}

impl<C> NamedCircuit<C> {
    pub fn new(name: impl Into<String>, circuit: C) -> Self {
        Self {
            name: name.into(),
            circuit: Arc::new(circuit),
        }
    }
}

impl<C> Clone for NamedCircuit<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            circuit: Arc::clone(&self.circuit),
        }
    }
}

/// File written by an exporter for one circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    /// Exporter that wrote the file.
    pub producer: CapabilityId,
    pub circuit_name: String,
}

/// Unordered pair of artifacts of the same circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactPair<'a> {
    pub first: &'a Artifact,
    pub second: &'a Artifact,
}

/// Index pairs `(i, j)` with `i < j` over `len` items, in lexicographic order.
pub fn pair_indices(len: usize) -> Vec<(usize, usize)> {
    (0..len)
        .flat_map(|i| ((i + 1)..len).map(move |j| (i, j)))
        .collect()
}

/// All 2-combinations of `artifacts` in discovery order, without self-pairs.
pub fn pairs(artifacts: &[Artifact]) -> Vec<ArtifactPair<'_>> {
    pair_indices(artifacts.len())
        .into_iter()
        .map(|(i, j)| ArtifactPair {
            first: &artifacts[i],
            second: &artifacts[j],
        })
        .collect()
}

/// `<source-stem>_<circuit-name>_<backend>.<extension>`
pub fn artifact_file_name(
    source_stem: &str,
    circuit_name: &str,
    backend: &str,
    extension: &str,
) -> String {
    format!("{source_stem}_{circuit_name}_{backend}.{extension}")
}
