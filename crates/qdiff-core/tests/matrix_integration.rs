//! Integration tests for matrix execution against closure-backed capabilities.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use qdiff_core::{
    CapabilityRegistry, DiffError, ExportRequest, FailureRecord, FnComparator, FnExporter,
    FnImporter, MatrixConfig, MatrixExecutor, MatrixStatus, NamedCircuit, Role, Verdict,
};

type Circuit = String;

fn writing_exporter(
    name: &str,
) -> FnExporter<impl Fn(&Circuit, &ExportRequest) -> anyhow::Result<PathBuf>> {
    FnExporter::new(
        name,
        |circuit: &Circuit, req: &ExportRequest| -> anyhow::Result<PathBuf> {
            std::fs::write(&req.suggested_path, circuit)?;
            Ok(req.suggested_path.clone())
        },
    )
}

fn failing_exporter(
    name: &str,
) -> FnExporter<impl Fn(&Circuit, &ExportRequest) -> anyhow::Result<PathBuf>> {
    FnExporter::new(
        name,
        |_: &Circuit, _: &ExportRequest| -> anyhow::Result<PathBuf> {
            anyhow::bail!("unsupported gate: ccx")
        },
    )
}

/// Exporter that refuses circuits whose name starts with `bad`.
fn picky_exporter(
    name: &str,
) -> FnExporter<impl Fn(&Circuit, &ExportRequest) -> anyhow::Result<PathBuf>> {
    FnExporter::new(
        name,
        |circuit: &Circuit, req: &ExportRequest| -> anyhow::Result<PathBuf> {
            if req.circuit_name.starts_with("bad") {
                anyhow::bail!("cannot export {}", req.circuit_name);
            }
            std::fs::write(&req.suggested_path, circuit)?;
            Ok(req.suggested_path.clone())
        },
    )
}

fn counting_importer(
    name: &str,
    calls: Arc<AtomicUsize>,
) -> FnImporter<impl Fn(&Path) -> anyhow::Result<()>> {
    FnImporter::new(name, move |_: &Path| -> anyhow::Result<()> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn counting_comparator(
    name: &str,
    calls: Arc<AtomicUsize>,
) -> FnComparator<impl Fn(&Path, &Path) -> anyhow::Result<Verdict>> {
    FnComparator::new(
        name,
        move |_: &Path, _: &Path| -> anyhow::Result<Verdict> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Verdict::Equivalent)
        },
    )
}

fn error_records(dir: &Path) -> Vec<FailureRecord> {
    let mut records = Vec::new();
    for entry in std::fs::read_dir(dir).expect("read output dir") {
        let path = entry.expect("dir entry").path();
        let is_record = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_error.json"));
        if is_record {
            let raw = std::fs::read_to_string(&path).expect("read record");
            records.push(serde_json::from_str(&raw).expect("parse record"));
        }
    }
    records
}

/// Test: k artifacts and m comparators yield C(k,2) * m comparisons
#[tokio::test]
async fn test_comparison_count_is_pairs_times_comparators() {
    let dir = tempfile::tempdir().expect("tempdir");
    let imports = Arc::new(AtomicUsize::new(0));
    let compares = Arc::new(AtomicUsize::new(0));

    let mut registry = CapabilityRegistry::new();
    for name in ["E1", "E2", "E3", "E4"] {
        registry
            .register_exporter(writing_exporter(name))
            .expect("register exporter");
    }
    registry
        .register_importer(counting_importer("I1", imports.clone()))
        .expect("I1");
    registry
        .register_importer(counting_importer("I2", imports.clone()))
        .expect("I2");
    registry
        .register_comparator(counting_comparator("C1", compares.clone()))
        .expect("C1");
    registry
        .register_comparator(counting_comparator("C2", compares.clone()))
        .expect("C2");

    let executor = MatrixExecutor::new(
        registry,
        MatrixConfig::new(dir.path(), "prog_0001.py").with_max_concurrency(3),
    );
    let outcome = executor
        .run(&NamedCircuit::new("qc", "OPENQASM 2.0;".to_string()))
        .await;

    assert_eq!(outcome.status, MatrixStatus::Completed);
    assert_eq!(outcome.artifacts.len(), 4);
    assert_eq!(outcome.import_attempts, 8, "2 importers x 4 artifacts");
    assert_eq!(imports.load(Ordering::SeqCst), 8);
    assert_eq!(outcome.compare_invocations, 12, "C(4,2)=6 pairs x 2 comparators");
    assert_eq!(compares.load(Ordering::SeqCst), 12);
    assert!(outcome.is_clean());
    assert!(error_records(dir.path()).is_empty());

    let producers: Vec<&str> = outcome
        .artifacts
        .iter()
        .map(|a| a.producer.as_str())
        .collect();
    assert_eq!(producers, vec!["E1", "E2", "E3", "E4"]);
}

/// Test: when every exporter fails nothing is imported or compared
#[tokio::test]
async fn test_no_artifacts_skips_import_and_compare() {
    let dir = tempfile::tempdir().expect("tempdir");
    let imports = Arc::new(AtomicUsize::new(0));
    let compares = Arc::new(AtomicUsize::new(0));

    let mut registry = CapabilityRegistry::new();
    registry
        .register_exporter(failing_exporter("A"))
        .expect("A");
    registry
        .register_exporter(failing_exporter("B"))
        .expect("B");
    registry
        .register_importer(counting_importer("I", imports.clone()))
        .expect("I");
    registry
        .register_comparator(counting_comparator("C", compares.clone()))
        .expect("C");

    let executor = MatrixExecutor::new(registry, MatrixConfig::new(dir.path(), "prog.py"));
    let outcome = executor
        .run(&NamedCircuit::new("qc", String::new()))
        .await;

    assert_eq!(outcome.status, MatrixStatus::NoArtifacts);
    assert_eq!(outcome.export_attempts, 2);
    assert_eq!(outcome.import_attempts, 0);
    assert_eq!(outcome.compare_invocations, 0);
    assert_eq!(imports.load(Ordering::SeqCst), 0);
    assert_eq!(compares.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.failures_in(Role::Export).count(), 2);

    let mut involved: Vec<Vec<String>> = error_records(dir.path())
        .into_iter()
        .map(|r| r.involved_capabilities)
        .collect();
    involved.sort();
    assert_eq!(involved, vec![vec!["A".to_string()], vec!["B".to_string()]]);
}

/// Test: a raising comparator yields exactly one record naming comparator then both producers
#[tokio::test]
async fn test_comparator_failure_names_pair() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut registry = CapabilityRegistry::new();
    registry.register_exporter(writing_exporter("A")).expect("A");
    registry.register_exporter(writing_exporter("B")).expect("B");
    registry
        .register_importer(counting_importer("I", Arc::new(AtomicUsize::new(0))))
        .expect("I");
    registry
        .register_comparator(FnComparator::new(
            "C",
            |_: &Path, _: &Path| -> anyhow::Result<Verdict> {
                anyhow::bail!("equivalence checker crashed")
            },
        ))
        .expect("C");

    let executor = MatrixExecutor::new(registry, MatrixConfig::new(dir.path(), "prog_0042.py"));
    let outcome = executor
        .run(&NamedCircuit::new("qc", "OPENQASM 2.0;".to_string()))
        .await;

    assert_eq!(outcome.status, MatrixStatus::Completed);
    assert_eq!(outcome.failures.len(), 1);

    let records = error_records(dir.path());
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.involved_capabilities, vec!["C", "A", "B"]);
    assert_eq!(record.source_identifier, "prog_0042.py");
    assert!(record.exception_message.contains("equivalence checker crashed"));
    assert_eq!(record.stage, Some(Role::Compare));

    let written = outcome.failures[0].path.as_ref().expect("record path");
    let file_name = written
        .file_name()
        .and_then(|n| n.to_str())
        .expect("file name");
    assert!(file_name.starts_with("prog_0042_"));
    assert!(file_name.ends_with("_error.json"));
}

/// Test: a not-equivalent verdict is recorded like a failure
#[tokio::test]
async fn test_not_equivalent_verdict_is_recorded() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut registry = CapabilityRegistry::new();
    registry.register_exporter(writing_exporter("A")).expect("A");
    registry.register_exporter(writing_exporter("B")).expect("B");
    registry
        .register_comparator(FnComparator::new(
            "C",
            |_: &Path, _: &Path| -> anyhow::Result<Verdict> {
                Ok(Verdict::not_equivalent("unitaries differ"))
            },
        ))
        .expect("C");

    let executor = MatrixExecutor::new(registry, MatrixConfig::new(dir.path(), "prog.py"));
    let outcome = executor
        .run(&NamedCircuit::new("qc", "OPENQASM 2.0;".to_string()))
        .await;

    let failures: Vec<_> = outcome.failures_in(Role::Compare).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].record.exception_message, "unitaries differ");
    assert_eq!(failures[0].record.involved_capabilities, vec!["C", "A", "B"]);
}

/// Test: a circuit without artifacts does not stop the rest of the batch
#[tokio::test]
async fn test_batch_continues_after_empty_circuit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let compares = Arc::new(AtomicUsize::new(0));

    let mut registry = CapabilityRegistry::new();
    registry.register_exporter(picky_exporter("A")).expect("A");
    registry.register_exporter(picky_exporter("B")).expect("B");
    registry
        .register_comparator(counting_comparator("C", compares.clone()))
        .expect("C");

    let executor = MatrixExecutor::new(registry, MatrixConfig::new(dir.path(), "prog.py"));
    let circuits = vec![
        NamedCircuit::new("bad_qc", "x".to_string()),
        NamedCircuit::new("qc", "y".to_string()),
    ];
    let outcomes = executor.run_batch(&circuits).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].circuit_name, "bad_qc");
    assert_eq!(outcomes[0].status, MatrixStatus::NoArtifacts);
    assert_eq!(outcomes[1].circuit_name, "qc");
    assert_eq!(outcomes[1].status, MatrixStatus::Completed);
    assert_eq!(outcomes[1].compare_invocations, 1);
    assert_eq!(compares.load(Ordering::SeqCst), 1);
}

/// Test: a single artifact is imported but never compared
#[tokio::test]
async fn test_single_artifact_has_no_pairs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let imports = Arc::new(AtomicUsize::new(0));
    let compares = Arc::new(AtomicUsize::new(0));

    let mut registry = CapabilityRegistry::new();
    registry.register_exporter(writing_exporter("A")).expect("A");
    registry.register_exporter(failing_exporter("B")).expect("B");
    registry
        .register_importer(counting_importer("I", imports.clone()))
        .expect("I");
    registry
        .register_comparator(counting_comparator("C", compares.clone()))
        .expect("C");

    let executor = MatrixExecutor::new(registry, MatrixConfig::new(dir.path(), "prog.py"));
    let outcome = executor
        .run(&NamedCircuit::new("qc", "OPENQASM 2.0;".to_string()))
        .await;

    assert_eq!(outcome.status, MatrixStatus::Completed);
    assert_eq!(imports.load(Ordering::SeqCst), 1);
    assert_eq!(compares.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.failures_in(Role::Export).count(), 1);
}

fn fixed_content_exporter(
    name: &str,
    content: &'static str,
) -> FnExporter<impl Fn(&Circuit, &ExportRequest) -> anyhow::Result<PathBuf>> {
    FnExporter::new(
        name,
        move |_: &Circuit, req: &ExportRequest| -> anyhow::Result<PathBuf> {
            std::fs::write(&req.suggested_path, content)?;
            Ok(req.suggested_path.clone())
        },
    )
}

/// Test: exporters whose names reduce to one backend label cannot both register
#[test]
fn test_shared_backend_label_is_rejected() {
    let mut registry = CapabilityRegistry::<Circuit>::new();
    registry
        .register_exporter(fixed_content_exporter("export_to_qasm_with_qiskit", "AAA"))
        .expect("first exporter");
    let err = registry
        .register_exporter(fixed_content_exporter("qiskit", "BBB"))
        .err()
        .expect("second exporter must be rejected");
    assert!(matches!(err, DiffError::DuplicateBackend { .. }));
    assert_eq!(registry.exporters().len(), 1);
}

/// Test: every artifact of a circuit lands in its own file and keeps its content
#[tokio::test]
async fn test_artifacts_never_share_a_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut registry = CapabilityRegistry::new();
    registry
        .register_exporter(fixed_content_exporter("export_to_qasm_with_qiskit", "AAA"))
        .expect("qiskit");
    registry
        .register_exporter(fixed_content_exporter("export_to_qasm_with_pytket", "BBB"))
        .expect("pytket");

    let executor = MatrixExecutor::new(registry, MatrixConfig::new(dir.path(), "prog.py"));
    let outcome = executor
        .run(&NamedCircuit::new("qc", String::new()))
        .await;

    assert_eq!(outcome.artifacts.len(), 2);
    assert_ne!(outcome.artifacts[0].path, outcome.artifacts[1].path);
    let contents: Vec<String> = outcome
        .artifacts
        .iter()
        .map(|a| std::fs::read_to_string(&a.path).expect("read artifact"))
        .collect();
    assert_eq!(contents, vec!["AAA", "BBB"]);
}
