//! Call graph construction and the derived reverse-call index.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use tracing::debug;

use super::entities::{FileScope, Lookup, SymbolTable};
use crate::analysis::{AnalyzerRegistry, FileFacts, LanguageAnalyzer, RawCallSite, Receiver};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::model::{CallEdge, CallKind, Callee, EntityIdx, EntityKind, UnresolvedReason};

/// Forward call edges plus a reverse index keyed by callee.
///
/// The reverse index is never updated independently: every mutation goes
/// through `insert` or `retain`, which keep it equal to the group-by-callee
/// view of `edges`.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    edges: Vec<CallEdge>,
    reverse: BTreeMap<Callee, Vec<usize>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges(edges: impl IntoIterator<Item = CallEdge>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.insert(edge);
        }
        graph
    }

    /// Append an edge and return its position.
    pub fn insert(&mut self, edge: CallEdge) -> usize {
        let position = self.edges.len();
        self.reverse
            .entry(edge.callee.clone())
            .or_default()
            .push(position);
        self.edges.push(edge);
        position
    }

    /// Keep only edges matching `keep`; positions are renumbered.
    pub fn retain(&mut self, keep: impl FnMut(&CallEdge) -> bool) {
        self.edges.retain(keep);
        self.reindex();
    }

    /// Remove every edge whose call site is in `file`. Returns the number of
    /// edges removed.
    pub fn remove_file(&mut self, file: &str) -> usize {
        let before = self.edges.len();
        self.retain(|edge| edge.file != file);
        before - self.edges.len()
    }

    fn reindex(&mut self) {
        self.reverse.clear();
        for (position, edge) in self.edges.iter().enumerate() {
            self.reverse
                .entry(edge.callee.clone())
                .or_default()
                .push(position);
        }
    }

    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Positions of edges per callee, in insertion order.
    pub fn reverse_index(&self) -> &BTreeMap<Callee, Vec<usize>> {
        &self.reverse
    }

    pub fn callers_of<'a>(&'a self, callee: &Callee) -> impl Iterator<Item = &'a CallEdge> + 'a {
        let positions = self.reverse.get(callee).map(|p| p.as_slice()).unwrap_or(&[]);
        positions.iter().map(move |p| &self.edges[*p])
    }

    pub fn callees_of(&self, caller: EntityIdx) -> impl Iterator<Item = &CallEdge> {
        self.edges.iter().filter(move |e| e.caller == caller)
    }
}

enum Outcome {
    Bound(EntityIdx, CallKind),
    /// Picked by name among methods of unrelated types.
    Guessed { target: EntityIdx, candidates: usize },
    Unresolved(UnresolvedReason),
}

struct FileResolver<'a> {
    symbols: &'a SymbolTable,
    scope: &'a FileScope,
    analyzer: Option<&'a dyn LanguageAnalyzer>,
}

impl<'a> FileResolver<'a> {
    fn resolve(&self, site: &RawCallSite) -> Option<(CallEdge, Option<Diagnostic>)> {
        let caller = self
            .scope
            .locals
            .get(site.caller)
            .or_else(|| self.scope.locals.first())
            .copied()?;
        let name = site.callee.as_str();

        let outcome = match &site.receiver {
            Receiver::None => self.plain(caller, name),
            Receiver::SelfRef => self.self_call(caller, name),
            Receiver::Super => self.super_call(caller, name),
            Receiver::Construct(ty) => self.typed_call(caller, ty, name, true),
            Receiver::Path(path) => match &site.receiver_type {
                Some(ty) => self.typed_call(caller, ty, name, false),
                None => self.path_call(caller, path, name),
            },
            Receiver::Expr => self.heuristic(name),
        };

        let edge = |callee: Callee, kind: CallKind| CallEdge {
            caller,
            callee,
            kind,
            line: site.line,
            file: self.scope.path.clone(),
        };

        match outcome {
            Outcome::Bound(target, kind) => {
                let (target, kind) = self.callable_target(target, kind);
                if site.callback {
                    return self
                        .symbols
                        .entity(target)
                        .kind
                        .is_callable()
                        .then(|| (edge(Callee::Entity(target), CallKind::Callback), None));
                }
                Some((edge(Callee::Entity(target), kind), None))
            }
            Outcome::Guessed { target, candidates } => {
                if site.callback {
                    return None;
                }
                let diagnostic = (candidates > 1).then(|| {
                    Diagnostic::warning(
                        DiagnosticKind::ResolutionAmbiguity,
                        format!(
                            "call to `{}` matches {} methods; guessed `{}`",
                            name,
                            candidates,
                            self.symbols.entity(target).id
                        ),
                    )
                    .in_file(&self.scope.path)
                    .at_line(site.line)
                });
                Some((edge(Callee::Entity(target), CallKind::Dynamic), diagnostic))
            }
            Outcome::Unresolved(_) if site.callback => None,
            Outcome::Unresolved(reason) => {
                let kind = if reason.is_external() {
                    CallKind::External
                } else {
                    CallKind::Dynamic
                };
                let callee = Callee::Unresolved {
                    name: name.to_string(),
                    reason,
                };
                Some((edge(callee, kind), None))
            }
        }
    }

    /// Calls to a type go to its constructor when it declares one; values
    /// that happen to be called are dynamic.
    fn callable_target(&self, target: EntityIdx, kind: CallKind) -> (EntityIdx, CallKind) {
        let entity = self.symbols.entity(target);
        if entity.kind.is_type() {
            let names = self
                .analyzer
                .map(|a| a.constructor_names(&entity.name))
                .unwrap_or_default();
            let constructor = names.iter().find_map(|ctor| {
                self.symbols
                    .member(target, ctor)
                    .found()
                    .filter(|m| self.symbols.entity(*m).kind.is_callable())
            });
            return (constructor.unwrap_or(target), kind);
        }
        match entity.kind {
            EntityKind::Function | EntityKind::Method => (target, kind),
            _ => (target, CallKind::Dynamic),
        }
    }

    fn member_kind(&self, ty: EntityIdx, name: &str, exact: bool) -> CallKind {
        if !exact && self.symbols.is_overridden(ty, name) {
            CallKind::Override
        } else {
            CallKind::DirectCall
        }
    }

    fn plain(&self, caller: EntityIdx, name: &str) -> Outcome {
        if let Some(found) = self.symbols.lexical(caller, name) {
            return Outcome::Bound(found, CallKind::DirectCall);
        }
        if self.analyzer.is_some_and(|a| a.implicit_member_calls()) {
            if let Some(ty) = self.symbols.enclosing_type(caller) {
                if let Lookup::Found(found) = self.symbols.member(ty, name) {
                    return Outcome::Bound(found, self.member_kind(ty, name, false));
                }
            }
        }
        match self.symbols.lookup_path(self.scope, None, &[name], self.analyzer) {
            Lookup::Found(found) => Outcome::Bound(found, CallKind::DirectCall),
            Lookup::Unresolved(reason) => Outcome::Unresolved(reason),
        }
    }

    fn self_call(&self, caller: EntityIdx, name: &str) -> Outcome {
        let Some(ty) = self.symbols.enclosing_type(caller) else {
            return self.heuristic(name);
        };
        match self.symbols.member(ty, name) {
            Lookup::Found(found) => Outcome::Bound(found, self.member_kind(ty, name, false)),
            Lookup::Unresolved(reason) => Outcome::Unresolved(reason),
        }
    }

    fn super_call(&self, caller: EntityIdx, name: &str) -> Outcome {
        let Some(ty) = self.symbols.enclosing_type(caller) else {
            return Outcome::Unresolved(UnresolvedReason::NoCandidate);
        };
        let bases = &self.symbols.entity(ty).bases;
        for base in bases {
            if let Lookup::Found(found) = self.symbols.member(*base, name) {
                return Outcome::Bound(found, CallKind::Inheritance);
            }
        }
        // constructors and classes without declared bases reach the root object
        let constructor = self.analyzer.is_some_and(|a| {
            a.constructor_names(&self.symbols.entity(ty).name)
                .iter()
                .any(|c| c == name)
        });
        if constructor || bases.is_empty() || self.symbols.has_external_base(ty) {
            Outcome::Unresolved(UnresolvedReason::ExternalBase)
        } else {
            Outcome::Unresolved(UnresolvedReason::UnknownMember)
        }
    }

    fn typed_call(&self, caller: EntityIdx, ty: &str, name: &str, exact: bool) -> Outcome {
        let segments: Vec<&str> = ty.split('.').collect();
        match self
            .symbols
            .lookup_path(self.scope, Some(caller), &segments, self.analyzer)
        {
            Lookup::Found(found) if self.symbols.entity(found).kind.is_type() => {
                match self.symbols.member(found, name) {
                    Lookup::Found(member) => {
                        Outcome::Bound(member, self.member_kind(found, name, exact))
                    }
                    Lookup::Unresolved(reason) => Outcome::Unresolved(reason),
                }
            }
            Lookup::Unresolved(reason) if reason.is_external() => Outcome::Unresolved(reason),
            _ => self.heuristic(name),
        }
    }

    fn path_call(&self, caller: EntityIdx, path: &str, name: &str) -> Outcome {
        let mut segments: Vec<&str> = path.split('.').collect();
        segments.push(name);
        match self
            .symbols
            .lookup_path(self.scope, Some(caller), &segments, self.analyzer)
        {
            Lookup::Found(found) => Outcome::Bound(found, CallKind::DirectCall),
            Lookup::Unresolved(UnresolvedReason::NoCandidate)
            | Lookup::Unresolved(UnresolvedReason::UnknownReceiver) => self.heuristic(name),
            Lookup::Unresolved(reason) => Outcome::Unresolved(reason),
        }
    }

    /// Same-named methods, preferring the calling file, then its module, then
    /// modules it imports. Modules without an import relation are never used.
    fn heuristic(&self, name: &str) -> Outcome {
        let candidates = self.symbols.methods_named(name);
        let imported = self.scope.imported_modules();
        let tiers: [&dyn Fn(&EntityIdx) -> bool; 3] = [
            &|c: &EntityIdx| self.symbols.entity(*c).file == self.scope.path,
            &|c: &EntityIdx| self.symbols.entity(*c).module == self.scope.module,
            &|c: &EntityIdx| imported.contains(self.symbols.entity(*c).module.as_str()),
        ];
        for tier in tiers {
            let matching: Vec<EntityIdx> = candidates.iter().copied().filter(|c| tier(c)).collect();
            if let Some(first) = matching.first() {
                return Outcome::Guessed {
                    target: *first,
                    candidates: matching.len(),
                };
            }
        }
        Outcome::Unresolved(UnresolvedReason::UnknownReceiver)
    }
}

/// Resolve every call site and add the structural class-to-base edges.
///
/// Files are resolved in parallel; edges are merged in sorted path order so
/// the result equals a sequential pass.
pub fn build_call_graph(
    facts: &[FileFacts],
    symbols: &SymbolTable,
    registry: &AnalyzerRegistry,
) -> (CallGraph, Vec<Diagnostic>) {
    let by_path: HashMap<&str, &FileFacts> = facts.iter().map(|f| (f.path.as_str(), f)).collect();

    let per_file: Vec<(Vec<CallEdge>, Vec<Diagnostic>)> = symbols
        .files()
        .par_iter()
        .map(|scope| {
            let Some(file) = by_path.get(scope.path.as_str()) else {
                return (Vec::new(), Vec::new());
            };
            let resolver = FileResolver {
                symbols,
                scope,
                analyzer: registry.for_language(scope.language),
            };
            let mut edges = Vec::with_capacity(file.call_sites.len());
            let mut diagnostics = Vec::new();
            for site in &file.call_sites {
                if let Some((edge, diagnostic)) = resolver.resolve(site) {
                    edges.push(edge);
                    diagnostics.extend(diagnostic);
                }
            }
            (edges, diagnostics)
        })
        .collect();

    let mut graph = CallGraph::new();
    let mut diagnostics = Vec::new();
    for (edges, file_diagnostics) in per_file {
        for edge in edges {
            graph.insert(edge);
        }
        diagnostics.extend(file_diagnostics);
    }

    for link in symbols.inheritance() {
        let child = symbols.entity(link.child);
        graph.insert(CallEdge {
            caller: link.child,
            callee: Callee::Entity(link.base),
            kind: CallKind::Inheritance,
            line: child.line,
            file: child.file.clone(),
        });
    }

    debug!(
        "call graph: {} edges, {} ambiguous sites",
        graph.len(),
        diagnostics.len()
    );
    (graph, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{JavaAnalyzer, JavaScriptAnalyzer, PythonAnalyzer};
    use std::path::Path;

    fn facts_for(analyzer: &dyn LanguageAnalyzer, path: &str, source: &str) -> FileFacts {
        let parsed = analyzer.parse(Path::new(path), source.as_bytes()).unwrap();
        analyzer.extract_facts(&parsed).unwrap()
    }

    fn python(files: &[(&str, &str)]) -> Vec<FileFacts> {
        let analyzer = PythonAnalyzer::new();
        files.iter().map(|(p, s)| facts_for(&analyzer, p, s)).collect()
    }

    fn graph_for(facts: &[FileFacts]) -> (SymbolTable, CallGraph, Vec<Diagnostic>) {
        let registry = AnalyzerRegistry::with_defaults();
        let symbols = SymbolTable::build(facts, &registry);
        let (graph, diagnostics) = build_call_graph(facts, &symbols, &registry);
        (symbols, graph, diagnostics)
    }

    fn edge_to<'a>(symbols: &SymbolTable, graph: &'a CallGraph, id: &str) -> Vec<&'a CallEdge> {
        let idx = symbols.lookup_id(id).unwrap();
        graph.callers_of(&Callee::Entity(idx)).collect()
    }

    #[test]
    fn test_constructed_receiver_across_files() {
        let facts = python(&[
            ("a.py", "class X:\n    def m(self):\n        pass\n"),
            ("b.py", "from a import X\n\ndef run():\n    X().m()\n    X().m()\n"),
            ("c.py", "def unrelated():\n    pass\n"),
        ]);
        let (symbols, graph, _) = graph_for(&facts);
        let edges = edge_to(&symbols, &graph, "func:X.m");
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.file == "b.py" && e.kind == CallKind::DirectCall));
        assert_eq!(edges.iter().map(|e| e.line).collect::<Vec<_>>(), vec![4, 5]);
        // the constructor call itself targets the class, which has no __init__
        assert_eq!(edge_to(&symbols, &graph, "class:X").len(), 2);
    }

    #[test]
    fn test_unknown_name_is_dynamic() {
        let facts = python(&[("a.py", "def run():\n    mystery()\n    print('x')\n")]);
        let (_, graph, _) = graph_for(&facts);
        let kinds: Vec<_> = graph
            .edges()
            .iter()
            .map(|e| (e.kind, e.callee.clone()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (
                    CallKind::Dynamic,
                    Callee::Unresolved {
                        name: "mystery".to_string(),
                        reason: UnresolvedReason::NoCandidate
                    }
                ),
                (
                    CallKind::External,
                    Callee::Unresolved {
                        name: "print".to_string(),
                        reason: UnresolvedReason::ExternalImport
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_self_super_and_override() {
        let facts = python(&[(
            "zoo.py",
            r#"class Animal:
    def speak(self):
        pass

    def greet(self):
        self.speak()

class Dog(Animal):
    def __init__(self):
        super().__init__()

    def speak(self):
        super().speak()
"#,
        )]);
        let (symbols, graph, _) = graph_for(&facts);

        let to_animal_speak = edge_to(&symbols, &graph, "func:Animal.speak");
        let kinds: Vec<_> = to_animal_speak.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![CallKind::Override, CallKind::Inheritance]);

        let init = graph
            .edges()
            .iter()
            .find(|e| matches!(&e.callee, Callee::Unresolved { name, .. } if name == "__init__"))
            .unwrap();
        assert_eq!(init.kind, CallKind::External);

        let structural = edge_to(&symbols, &graph, "class:Animal");
        assert_eq!(structural.len(), 1);
        assert_eq!(structural[0].kind, CallKind::Inheritance);
    }

    #[test]
    fn test_callbacks_and_heuristic_ambiguity() {
        let facts = python(&[(
            "jobs.py",
            r#"class A:
    def run(self):
        pass

class B:
    def run(self):
        pass

def handler():
    pass

def main(obj):
    schedule(handler)
    schedule(missing)
    obj.run()
"#,
        )]);
        let (symbols, graph, diagnostics) = graph_for(&facts);
        let callbacks: Vec<_> = edge_to(&symbols, &graph, "func:handler");
        assert_eq!(callbacks.len(), 1);
        assert_eq!(callbacks[0].kind, CallKind::Callback);
        assert!(!graph
            .edges()
            .iter()
            .any(|e| matches!(&e.callee, Callee::Unresolved { name, .. } if name == "missing")));

        let guessed = edge_to(&symbols, &graph, "func:A.run");
        assert_eq!(guessed.len(), 1);
        assert_eq!(guessed[0].kind, CallKind::Dynamic);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::ResolutionAmbiguity);
    }

    #[test]
    fn test_heuristic_needs_import_relation() {
        let facts = python(&[
            ("a.py", "class A:\n    def run(self):\n        pass\n"),
            ("b.py", "def main(obj):\n    obj.run()\n"),
        ]);
        let (_, graph, _) = graph_for(&facts);
        assert_eq!(graph.len(), 1);
        assert_eq!(
            graph.edges()[0].callee,
            Callee::Unresolved {
                name: "run".to_string(),
                reason: UnresolvedReason::UnknownReceiver
            }
        );
    }

    #[test]
    fn test_java_implicit_member_and_constructor() {
        let analyzer = JavaAnalyzer::new();
        let facts = vec![
            facts_for(
                &analyzer,
                "com/x/Repo.java",
                "package com.x;\npublic class Repo {\n  public Repo() {}\n  public void save() {}\n}\n",
            ),
            facts_for(
                &analyzer,
                "com/y/Service.java",
                r#"package com.y;
import com.x.Repo;
public class Service {
  private Repo repo = new Repo();
  void handle() { validate(); repo.save(); System.out.println("x"); }
  void validate() {}
}
"#,
            ),
        ];
        let (symbols, graph, _) = graph_for(&facts);
        assert_eq!(edge_to(&symbols, &graph, "func:Repo.Repo").len(), 1);
        assert_eq!(edge_to(&symbols, &graph, "func:Repo.save").len(), 1);
        let validate = edge_to(&symbols, &graph, "func:Service.validate");
        assert_eq!(validate.len(), 1);
        assert_eq!(validate[0].kind, CallKind::DirectCall);
        assert!(graph.edges().iter().any(|e| e.kind == CallKind::External));
    }

    #[test]
    fn test_js_this_and_module_alias() {
        let analyzer = JavaScriptAnalyzer::new();
        let facts = vec![
            facts_for(&analyzer, "src/util.js", "export function fmt(x) { return x; }\n"),
            facts_for(
                &analyzer,
                "src/app.js",
                r#"import * as util from './util';
class App {
  run() { this.render(); util.fmt(1); }
  render() {}
}
"#,
            ),
        ];
        let (symbols, graph, _) = graph_for(&facts);
        assert_eq!(edge_to(&symbols, &graph, "func:App.render").len(), 1);
        assert_eq!(edge_to(&symbols, &graph, "func:fmt").len(), 1);
    }

    #[test]
    fn test_remove_file_keeps_reverse_index() {
        let facts = python(&[
            ("a.py", "def f():\n    pass\n"),
            ("b.py", "from a import f\n\ndef g():\n    f()\n"),
            ("c.py", "from a import f\n\ndef h():\n    f()\n"),
        ]);
        let (symbols, mut graph, _) = graph_for(&facts);
        let f = Callee::Entity(symbols.lookup_id("func:f").unwrap());
        assert_eq!(graph.callers_of(&f).count(), 2);
        assert_eq!(graph.remove_file("b.py"), 1);
        let remaining: Vec<_> = graph.callers_of(&f).map(|e| e.file.as_str()).collect();
        assert_eq!(remaining, vec!["c.py"]);
    }
}
