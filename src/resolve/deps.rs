//! Module dependency graph and circular-coupling detection.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use super::entities::{Lookup, SymbolTable};
use crate::analysis::{AnalyzerRegistry, BaseRelation, FileFacts, ImportKind, TypeRefKind};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::model::{DependencyEdge, DependencyKind};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: Vec<DependencyEdge>,
    modules: BTreeSet<String>,
    /// Each import cycle once, members sorted.
    cycles: Vec<Vec<String>>,
}

impl DependencyGraph {
    pub fn from_edges(modules: BTreeSet<String>, edges: Vec<DependencyEdge>) -> Self {
        let cycles = find_cycles(&modules, &edges);
        Self {
            edges,
            modules,
            cycles,
        }
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn modules(&self) -> &BTreeSet<String> {
        &self.modules
    }

    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// Edges whose source is `module`.
    pub fn dependencies_of<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a DependencyEdge> {
        self.edges.iter().filter(move |e| e.source == module)
    }

    /// Import edges from other project modules into `module`.
    pub fn imported_by<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a DependencyEdge> {
        self.edges
            .iter()
            .filter(move |e| e.kind.is_import() && !e.external && e.target == module)
    }
}

/// Strongly connected components of the internal import graph with more
/// than one module.
pub fn find_cycles(modules: &BTreeSet<String>, edges: &[DependencyEdge]) -> Vec<Vec<String>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let nodes: HashMap<&str, NodeIndex> = modules
        .iter()
        .map(|m| (m.as_str(), graph.add_node(m.as_str())))
        .collect();

    let mut seen = HashSet::new();
    for edge in edges {
        if !edge.kind.is_import() || edge.external || edge.source == edge.target {
            continue;
        }
        let (Some(&from), Some(&to)) = (nodes.get(edge.source.as_str()), nodes.get(edge.target.as_str()))
        else {
            continue;
        };
        if seen.insert((from, to)) {
            graph.add_edge(from, to, ());
        }
    }

    let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| {
            let mut members: Vec<String> = scc.iter().map(|n| graph[*n].to_string()).collect();
            members.sort();
            members
        })
        .collect();
    cycles.sort();
    cycles
}

/// Build import, inheritance and type-usage edges at module granularity.
pub fn build_dependency_graph(
    facts: &[FileFacts],
    symbols: &SymbolTable,
    registry: &AnalyzerRegistry,
) -> (DependencyGraph, Vec<Diagnostic>) {
    let mut order: Vec<&FileFacts> = facts.iter().collect();
    order.sort_by(|a, b| a.path.cmp(&b.path));

    let mut edges = Vec::new();
    for file in &order {
        let Some(scope) = symbols.file(&file.path) else {
            continue;
        };
        for (position, import) in file.imports.iter().enumerate() {
            let target = scope.import_targets.get(position).cloned().flatten();
            edges.push(DependencyEdge {
                source: file.module.clone(),
                external: target.is_none(),
                target: target.unwrap_or_else(|| import.module.clone()),
                kind: match import.kind {
                    ImportKind::Import => DependencyKind::Import,
                    ImportKind::Require => DependencyKind::Require,
                },
                symbols: import.symbols.iter().map(|s| s.name.clone()).collect(),
                file: file.path.clone(),
                line: import.line,
            });
        }
    }

    for link in symbols.inheritance() {
        let child = symbols.entity(link.child);
        let base = symbols.entity(link.base);
        if child.module == base.module {
            continue;
        }
        edges.push(DependencyEdge {
            source: child.module.clone(),
            target: base.module.clone(),
            kind: match link.relation {
                BaseRelation::Extends => DependencyKind::Inheritance,
                BaseRelation::Implements => DependencyKind::Implementation,
            },
            symbols: vec![base.name.clone()],
            file: child.file.clone(),
            line: child.line,
            external: false,
        });
    }

    // declared field and parameter types
    let mut usages: BTreeSet<(String, String, DependencyKind, String)> = BTreeSet::new();
    for file in &order {
        if file.type_refs.is_empty() {
            continue;
        }
        let Some(scope) = symbols.file(&file.path) else {
            continue;
        };
        let analyzer = registry.for_language(file.language);
        for type_ref in &file.type_refs {
            let segments: Vec<&str> = type_ref.type_name.split('.').collect();
            let Lookup::Found(target) = symbols.lookup_path(scope, None, &segments, analyzer) else {
                continue;
            };
            let target = symbols.entity(target);
            if !target.kind.is_type() || target.module == file.module {
                continue;
            }
            let kind = match type_ref.kind {
                TypeRefKind::Field => DependencyKind::Composition,
                TypeRefKind::Parameter => DependencyKind::Association,
            };
            let key = (file.module.clone(), target.module.clone(), kind, target.name.clone());
            if usages.insert(key) {
                edges.push(DependencyEdge {
                    source: file.module.clone(),
                    target: target.module.clone(),
                    kind,
                    symbols: vec![target.name.clone()],
                    file: file.path.clone(),
                    line: type_ref.line,
                    external: false,
                });
            }
        }
    }

    let graph = DependencyGraph::from_edges(symbols.modules().clone(), edges);
    let diagnostics: Vec<Diagnostic> = graph
        .cycles()
        .iter()
        .map(|members| {
            Diagnostic::warning(
                DiagnosticKind::CircularDependency,
                format!("circular dependency between modules: {}", members.join(", ")),
            )
        })
        .collect();

    let per_module: BTreeMap<&str, usize> = graph.edges().iter().fold(BTreeMap::new(), |mut acc, e| {
        *acc.entry(e.source.as_str()).or_insert(0) += 1;
        acc
    });
    debug!(
        "dependency graph: {} edges across {} modules, {} cycles",
        graph.edges().len(),
        per_module.len(),
        graph.cycles().len()
    );
    (graph, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{JavaAnalyzer, JavaScriptAnalyzer, LanguageAnalyzer, PythonAnalyzer};
    use std::path::Path;

    fn facts_for(analyzer: &dyn LanguageAnalyzer, path: &str, source: &str) -> FileFacts {
        let parsed = analyzer.parse(Path::new(path), source.as_bytes()).unwrap();
        analyzer.extract_facts(&parsed).unwrap()
    }

    fn graph_for(facts: &[FileFacts]) -> (DependencyGraph, Vec<Diagnostic>) {
        let registry = AnalyzerRegistry::with_defaults();
        let symbols = SymbolTable::build(facts, &registry);
        build_dependency_graph(facts, &symbols, &registry)
    }

    fn edge(source: &str, target: &str) -> DependencyEdge {
        DependencyEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind: DependencyKind::Import,
            symbols: Vec::new(),
            file: format!("{}.py", source),
            line: 1,
            external: false,
        }
    }

    #[test]
    fn test_three_cycle_reported_once() {
        let modules: BTreeSet<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let edges = vec![
            edge("a", "b"),
            edge("b", "c"),
            edge("c", "a"),
            edge("a", "b"),
            edge("c", "d"),
        ];
        let cycles = find_cycles(&modules, &edges);
        assert_eq!(cycles, vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]);
    }

    #[test]
    fn test_self_and_external_imports_are_not_cycles() {
        let modules: BTreeSet<String> = ["a"].iter().map(|s| s.to_string()).collect();
        let mut external = edge("a", "os");
        external.external = true;
        let cycles = find_cycles(&modules, &[edge("a", "a"), external]);
        assert!(cycles.is_empty());
    }

    #[test]
    fn test_python_imports_and_cycle_diagnostic() {
        let analyzer = PythonAnalyzer::new();
        let facts = vec![
            facts_for(&analyzer, "a.py", "import b\nimport os\n"),
            facts_for(&analyzer, "b.py", "from c import thing\n"),
            facts_for(&analyzer, "c.py", "from a import *\n\ndef thing():\n    pass\n"),
        ];
        let (graph, diagnostics) = graph_for(&facts);

        let a_edges: Vec<_> = graph.dependencies_of("a").collect();
        assert_eq!(a_edges.len(), 2);
        assert_eq!(a_edges[0].target, "b");
        assert!(!a_edges[0].external);
        assert_eq!(a_edges[1].target, "os");
        assert!(a_edges[1].external);

        let b_edge = graph.dependencies_of("b").next().unwrap();
        assert_eq!(b_edge.symbols, vec!["thing".to_string()]);

        let importers: Vec<_> = graph.imported_by("c").map(|e| e.source.as_str()).collect();
        assert_eq!(importers, vec!["b"]);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::CircularDependency);
        assert!(diagnostics[0].message.contains("a, b, c"));
    }

    #[test]
    fn test_require_and_inheritance_edges() {
        let analyzer = JavaScriptAnalyzer::new();
        let facts = vec![
            facts_for(&analyzer, "src/base.js", "export class Base {}\n"),
            facts_for(
                &analyzer,
                "src/child.js",
                "const { Base } = require('./base');\nclass Child extends Base {}\n",
            ),
        ];
        let (graph, _) = graph_for(&facts);
        let kinds: Vec<_> = graph
            .dependencies_of("src/child")
            .map(|e| (e.kind, e.target.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (DependencyKind::Require, "src/base"),
                (DependencyKind::Inheritance, "src/base"),
            ]
        );
    }

    #[test]
    fn test_java_composition_and_association() {
        let analyzer = JavaAnalyzer::new();
        let facts = vec![
            facts_for(&analyzer, "m/User.java", "package m;\npublic class User {}\n"),
            facts_for(&analyzer, "m/Repo.java", "package m;\npublic interface Repo {}\n"),
            facts_for(
                &analyzer,
                "s/Service.java",
                r#"package s;
import m.User;
import m.Repo;
public class Service implements Repo {
  private Repo repo;
  private Repo backup;
  void save(User user) {}
}
"#,
            ),
        ];
        let (graph, _) = graph_for(&facts);
        let kinds: Vec<_> = graph
            .dependencies_of("s")
            .map(|e| (e.kind, e.symbols[0].as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (DependencyKind::Import, "User"),
                (DependencyKind::Import, "Repo"),
                (DependencyKind::Implementation, "Repo"),
                (DependencyKind::Composition, "Repo"),
                (DependencyKind::Association, "User"),
            ]
        );
    }
}
