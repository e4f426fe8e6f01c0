//! Integration tests for the language analyzers against the polyglot
//! fixture, both file by file and through a full resolution pass.

use std::fs;
use std::path::{Path, PathBuf};

use codemap::analysis::{AnalyzerRegistry, FileFacts, LanguageAnalyzer};
use codemap::model::DependencyKind;
use codemap::{AnalysisConfig, CallKind, EntityKind, Language, Orchestrator};

fn polyglot() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join("polyglot")
}

fn facts_for(rel: &str) -> FileFacts {
    let registry = AnalyzerRegistry::with_defaults();
    let ext = Path::new(rel).extension().and_then(|e| e.to_str()).unwrap();
    let analyzer = registry.for_extension(ext).expect("analyzer for extension");
    let source = fs::read(polyglot().join(rel)).unwrap();
    let parsed = analyzer.parse(Path::new(rel), &source).unwrap();
    analyzer.extract_facts(&parsed).unwrap()
}

fn outcome() -> codemap::AnalysisOutcome {
    let mut orchestrator = Orchestrator::new(AnalysisConfig::default()).unwrap();
    orchestrator.run(&polyglot()).unwrap()
}

fn has_edge(outcome: &codemap::AnalysisOutcome, from: &str, to: &str, kind: CallKind) -> bool {
    outcome
        .artifacts
        .calls
        .edges
        .iter()
        .any(|e| e.from == from && e.to == to && e.kind == kind)
}

// =============================================================================
// Per-file extraction
// =============================================================================

#[test]
fn test_module_names_per_language() {
    assert_eq!(facts_for("py/shapes.py").module, "py.shapes");
    assert_eq!(facts_for("web/app.js").module, "web/app");
    assert_eq!(facts_for("web/service.ts").module, "web/service");
    assert_eq!(facts_for("java/com/acme/app/App.java").module, "com.acme.app");
    assert_eq!(facts_for("store/store.go").module, "store");
}

#[test]
fn test_languages_detected() {
    let cases = [
        ("py/report.py", Language::Python),
        ("web/util.js", Language::JavaScript),
        ("web/model.ts", Language::TypeScript),
        ("java/com/acme/Repo.java", Language::Java),
        ("cmd/main.go", Language::Go),
    ];
    for (path, language) in cases {
        assert_eq!(facts_for(path).language, language, "{}", path);
    }
}

#[test]
fn test_extraction_is_deterministic() {
    for path in ["py/shapes.py", "web/app.js", "java/com/acme/app/App.java", "cmd/main.go"] {
        let a = serde_json::to_string(&facts_for(path)).unwrap();
        let b = serde_json::to_string(&facts_for(path)).unwrap();
        assert_eq!(a, b, "{}", path);
    }
}

#[test]
fn test_python_classes_and_bases() {
    let facts = facts_for("py/shapes.py");
    let square = facts
        .entities
        .iter()
        .find(|e| e.qualified_name == "Square")
        .unwrap();
    assert_eq!(square.kind, EntityKind::Class);
    assert_eq!(square.bases[0].name, "Shape");
    let methods: Vec<_> = facts
        .entities
        .iter()
        .filter(|e| e.kind == EntityKind::Method)
        .map(|e| e.qualified_name.as_str())
        .collect();
    assert_eq!(methods, vec!["Shape.area", "Square.area"]);
}

#[test]
fn test_imports_are_unresolved_at_extraction() {
    let facts = facts_for("web/service.ts");
    assert_eq!(facts.imports.len(), 1);
    assert_eq!(facts.imports[0].module, "./model");
    assert_eq!(facts.imports[0].symbols[0].name, "User");

    let go = facts_for("cmd/main.go");
    assert_eq!(go.imports[0].module, "example.com/demo/store");
}

#[test]
fn test_ternary_counts_toward_complexity() {
    let facts = facts_for("web/app.js");
    let render = facts
        .entities
        .iter()
        .find(|e| e.qualified_name == "render")
        .unwrap();
    assert_eq!(render.control_flow.unwrap().cyclomatic_complexity(), 2);
}

// =============================================================================
// Cross-file resolution
// =============================================================================

#[test]
fn test_entity_identities() {
    let outcome = outcome();
    let ids: Vec<&str> = outcome
        .artifacts
        .structure
        .entities
        .iter()
        .map(|e| e.id.as_str())
        .collect();
    for expected in [
        "module:py.shapes",
        "class:Shape",
        "class:Square",
        "func:Square.area",
        "func:total",
        "func:format",
        "func:render",
        "class:User",
        "func:User.greet",
        "func:welcome",
        "class:Repo",
        "class:App",
        "func:App.run",
        "func:Repo.save",
        "module:com.acme.app",
        "struct:Store",
        "func:Store.Put",
        "func:New",
        "func:main",
    ] {
        assert!(ids.contains(&expected), "missing {}", expected);
    }

    let square = outcome
        .artifacts
        .structure
        .entities
        .iter()
        .find(|e| e.id == "class:Square")
        .unwrap();
    assert_eq!(square.methods, vec!["func:Square.area".to_string()]);
    assert_eq!(square.bases, vec!["class:Shape".to_string()]);
}

#[test]
fn test_cross_file_calls_per_language() {
    let outcome = outcome();
    assert!(has_edge(&outcome, "func:total", "func:Square.area", CallKind::DirectCall));
    assert!(has_edge(&outcome, "func:render", "func:format", CallKind::DirectCall));
    assert!(has_edge(&outcome, "func:format", "external:String", CallKind::External));
    assert!(has_edge(&outcome, "func:welcome", "func:User.greet", CallKind::DirectCall));
    assert!(has_edge(&outcome, "func:App.run", "func:Repo.save", CallKind::DirectCall));
    assert!(has_edge(&outcome, "func:main", "func:New", CallKind::DirectCall));
    assert!(has_edge(&outcome, "class:Square", "class:Shape", CallKind::Inheritance));
}

#[test]
fn test_dependency_kinds() {
    let outcome = outcome();
    let edges = &outcome.artifacts.dependencies.edges;
    let has = |source: &str, target: &str, kind: DependencyKind| {
        edges
            .iter()
            .any(|e| e.source == source && e.target == target && e.kind == kind && !e.external)
    };
    assert!(has("py.report", "py.shapes", DependencyKind::Import));
    assert!(has("web/app", "web/util", DependencyKind::Import));
    assert!(has("web/service", "web/model", DependencyKind::Import));
    assert!(has("com.acme.app", "com.acme", DependencyKind::Import));
    assert!(has("com.acme.app", "com.acme", DependencyKind::Composition));
    assert!(has("cmd", "store", DependencyKind::Import));
    assert!(outcome.artifacts.dependencies.cycles.is_empty());
}
