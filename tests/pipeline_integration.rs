//! End-to-end tests of the analysis pipeline.
//!
//! Fixtures under `testdata/` are analyzed in place (the scanner never
//! writes); tests that modify files copy a fixture into a temp directory.

use std::fs;
use std::path::{Path, PathBuf};

use codemap::artifacts::ArtifactSet;
use codemap::metrics;
use codemap::{
    AnalysisCache, AnalysisConfig, CallKind, DiagnosticKind, Orchestrator, RunStatus,
};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name)
}

fn copy_fixture(name: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for entry in fs::read_dir(fixture(name)).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), dir.path().join(entry.file_name())).unwrap();
    }
    dir
}

fn analyze(root: &Path) -> codemap::AnalysisOutcome {
    let mut orchestrator = Orchestrator::new(AnalysisConfig::default()).unwrap();
    orchestrator.run(root).unwrap()
}

// =============================================================================
// Call graph scenarios
// =============================================================================

#[test]
fn test_three_file_scenario() {
    let outcome = analyze(&fixture("scenario"));
    assert_eq!(outcome.status, RunStatus::Complete);

    let calls = &outcome.artifacts.calls;
    let to_method: Vec<_> = calls.edges.iter().filter(|e| e.to == "func:X.m").collect();
    assert_eq!(to_method.len(), 2);
    let lines: Vec<usize> = to_method.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![10, 20]);
    assert!(to_method.iter().all(|e| e.kind == CallKind::DirectCall));

    let callers = &calls.reverse_calls["func:X.m"];
    assert_eq!(callers.len(), 2);
    assert!(callers.iter().all(|c| c.file == "b.py"));

    // c.py takes no part in any call
    assert!(calls.edges.iter().all(|e| e.file != "c.py"));
}

#[test]
fn test_unresolvable_call_is_dynamic() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("lonely.py"),
        "def caller():\n    return mystery_function(1)\n",
    )
    .unwrap();

    let outcome = analyze(dir.path());
    let edges = &outcome.artifacts.calls.edges;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from, "func:caller");
    assert_eq!(edges[0].kind, CallKind::Dynamic);
    assert_eq!(edges[0].to, "unresolved:mystery_function");
    assert_eq!(
        edges[0].unresolved.as_ref().map(|u| u.name.as_str()),
        Some("mystery_function")
    );
}

#[test]
fn test_reverse_calls_match_edges() {
    let outcome = analyze(&fixture("polyglot"));
    let calls = &outcome.artifacts.calls;
    let grouped: usize = calls.reverse_calls.values().map(|v| v.len()).sum();
    assert_eq!(grouped, calls.edges.len());
    for edge in &calls.edges {
        assert!(calls.reverse_calls[&edge.to]
            .iter()
            .any(|c| c.caller == edge.from && c.line == edge.line && c.file == edge.file));
    }
}

// =============================================================================
// Dependencies
// =============================================================================

#[test]
fn test_import_cycle_reported_once() {
    let outcome = analyze(&fixture("cycle"));
    let cycles: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::CircularDependency)
        .collect();
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].message.contains("a, b, c"));

    let deps = &outcome.artifacts.dependencies;
    assert_eq!(
        deps.cycles,
        vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]
    );
    let b = deps.modules.iter().find(|m| m.module == "b").unwrap();
    assert_eq!(b.imports[0].module, "c");
    assert_eq!(b.imported_by[0].module, "a");
}

// =============================================================================
// Cache
// =============================================================================

#[test]
fn test_unchanged_rerun_parses_nothing() {
    let dir = copy_fixture("scenario");
    let mut orchestrator = Orchestrator::new(AnalysisConfig::default()).unwrap();

    let first = orchestrator.run(dir.path()).unwrap();
    assert_eq!(first.stats.files_parsed, 3);
    assert_eq!(first.stats.cache_hits, 0);

    let second = orchestrator.run(dir.path()).unwrap();
    assert_eq!(second.stats.files_parsed, 0);
    assert_eq!(second.stats.cache_hits, 3);
    assert_eq!(second.stats.resolution_passes, 1);
    assert_eq!(first.artifacts.render().unwrap(), second.artifacts.render().unwrap());
}

#[test]
fn test_one_changed_file_reparses_exactly_that_file() {
    let dir = copy_fixture("scenario");
    let mut orchestrator = Orchestrator::new(AnalysisConfig::default()).unwrap();
    orchestrator.run(dir.path()).unwrap();

    fs::write(
        dir.path().join("c.py"),
        "def unrelated(value):\n    return X\n\n\ndef another():\n    pass\n",
    )
    .unwrap();
    let outcome = orchestrator.run(dir.path()).unwrap();
    assert_eq!(outcome.stats.files_parsed, 1);
    assert_eq!(outcome.stats.cache_hits, 2);
    assert_eq!(outcome.stats.resolution_passes, 1);
    assert!(outcome
        .artifacts
        .structure
        .entities
        .iter()
        .any(|e| e.id == "func:another"));
}

#[test]
fn test_persistent_cache_across_orchestrators() {
    let dir = copy_fixture("scenario");
    let cache_dir = tempfile::tempdir().unwrap();

    let mut first = Orchestrator::new(AnalysisConfig::default())
        .unwrap()
        .with_cache(AnalysisCache::open(cache_dir.path()).unwrap());
    let before = first.run(dir.path()).unwrap();

    let mut second = Orchestrator::new(AnalysisConfig::default())
        .unwrap()
        .with_cache(AnalysisCache::open(cache_dir.path()).unwrap());
    let after = second.run(dir.path()).unwrap();
    assert_eq!(after.stats.files_parsed, 0);
    assert_eq!(after.stats.cache_hits, 3);
    assert_eq!(before.artifacts.render().unwrap(), after.artifacts.render().unwrap());
}

#[test]
fn test_corrupt_cache_entry_forces_reparse_of_that_file() {
    let dir = copy_fixture("scenario");
    let cache_dir = tempfile::tempdir().unwrap();

    let mut first = Orchestrator::new(AnalysisConfig::default())
        .unwrap()
        .with_cache(AnalysisCache::open(cache_dir.path()).unwrap());
    first.run(dir.path()).unwrap();

    let victim = fs::read_dir(cache_dir.path())
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    fs::write(&victim, b"garbage").unwrap();

    let mut second = Orchestrator::new(AnalysisConfig::default())
        .unwrap()
        .with_cache(AnalysisCache::open(cache_dir.path()).unwrap());
    let outcome = second.run(dir.path()).unwrap();
    assert_eq!(outcome.status, RunStatus::Complete);
    assert_eq!(outcome.stats.files_parsed, 1);
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::CacheCorruption));
}

// =============================================================================
// Artifacts
// =============================================================================

#[test]
fn test_full_runs_are_byte_identical() {
    let first = analyze(&fixture("polyglot")).artifacts.render().unwrap();
    let second = analyze(&fixture("polyglot")).artifacts.render().unwrap();
    assert_eq!(first.len(), 5);
    for ((name_a, a), (name_b, b)) in first.iter().zip(second.iter()) {
        assert_eq!(name_a, name_b);
        assert_eq!(a, b, "{} differs between runs", name_a);
    }
}

#[test]
fn test_metrics_recomputed_from_artifacts() {
    let outcome = analyze(&fixture("polyglot"));
    let out = tempfile::tempdir().unwrap();
    outcome.artifacts.write_to_dir(out.path()).unwrap();

    let read_back = ArtifactSet::read_from_dir(out.path()).unwrap();
    assert_eq!(read_back, outcome.artifacts);
    let recomputed = metrics::compute(
        &read_back.metrics_input(),
        AnalysisConfig::default().hotspot_count,
    );
    assert_eq!(recomputed, outcome.artifacts.metrics.report);
}

#[test]
fn test_metrics_overall_block() {
    let outcome = analyze(&fixture("scenario"));
    let report = &outcome.artifacts.metrics.report;
    assert_eq!(report.files.len(), 3);
    assert_eq!(report.overall.files, 3);
    // c.py: one callable with one if
    let c = report.files.iter().find(|f| f.file == "c.py").unwrap();
    assert_eq!(c.cyclomatic_complexity, 2);
    assert_eq!(c.loc, 4);
    assert_eq!(report.overall.complexity_hotspots[0].file, "c.py");
    assert_eq!(report.overall.calls.total_calls, outcome.artifacts.calls.edges.len());
}

// =============================================================================
// Limits and budgets
// =============================================================================

#[test]
fn test_size_limit_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let exact = "x = 1\n".repeat(10);
    fs::write(dir.path().join("exact.py"), &exact).unwrap();
    fs::write(dir.path().join("over.py"), format!("{} ", exact)).unwrap();

    let config = AnalysisConfig {
        max_file_size: exact.len() as u64,
        ..AnalysisConfig::default()
    };
    let mut orchestrator = Orchestrator::new(config).unwrap();
    let outcome = orchestrator.run(dir.path()).unwrap();

    let files: Vec<&str> = outcome
        .artifacts
        .structure
        .files
        .iter()
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(files, vec!["exact.py"]);
    let skipped: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::ResourceLimitExceeded)
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].file.as_deref(), Some("over.py"));
    assert_eq!(outcome.status, RunStatus::Partial);
}

#[test]
fn test_timeout_marks_artifacts_partial() {
    let config = AnalysisConfig {
        timeout_secs: 0,
        ..AnalysisConfig::default()
    };
    let mut orchestrator = Orchestrator::new(config).unwrap();
    let outcome = orchestrator.run(&fixture("scenario")).unwrap();
    assert_eq!(outcome.status, RunStatus::Partial);
    assert!(outcome.artifacts.structure.partial);
    assert!(outcome.artifacts.calls.partial);
    assert!(outcome.artifacts.metrics.partial);
    assert!(outcome.artifacts.structure.entities.is_empty());
}

#[test]
fn test_memory_budget_stops_at_batch_boundary() {
    let config = AnalysisConfig {
        memory_limit_mb: 0,
        batch_size: 1,
        ..AnalysisConfig::default()
    };
    let mut orchestrator = Orchestrator::new(config).unwrap();
    let outcome = orchestrator.run(&fixture("scenario")).unwrap();
    assert_eq!(outcome.status, RunStatus::Partial);
    assert_eq!(outcome.stats.files_parsed, 1);
    assert_eq!(outcome.artifacts.structure.files[0].path, "a.py");
}

#[test]
fn test_file_count_limit_is_partial() {
    let config = AnalysisConfig {
        max_files: 2,
        ..AnalysisConfig::default()
    };
    let mut orchestrator = Orchestrator::new(config).unwrap();
    let outcome = orchestrator.run(&fixture("scenario")).unwrap();
    assert_eq!(outcome.status, RunStatus::Partial);
    assert_eq!(outcome.artifacts.structure.files.len(), 2);
}

#[test]
fn test_parse_errors_do_not_abort() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("good.py"), "def ok():\n    return 1\n").unwrap();
    fs::write(
        dir.path().join("bad.py"),
        "def broken(:\n    return\n\ndef other():\n    return 2\n",
    )
    .unwrap();

    let outcome = analyze(dir.path());
    assert_eq!(outcome.status, RunStatus::Complete);
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::ParseError && d.file.as_deref() == Some("bad.py")));

    let structure = &outcome.artifacts.structure;
    assert!(structure.entities.iter().any(|e| e.id == "func:ok"));
    let from_bad: Vec<&str> = structure
        .entities
        .iter()
        .filter(|e| e.file == "bad.py")
        .map(|e| e.id.as_str())
        .collect();
    assert!(from_bad.is_empty(), "{:?}", from_bad);
    let bad = structure.files.iter().find(|f| f.path == "bad.py").unwrap();
    assert!(bad.parse_error.is_some());
}
