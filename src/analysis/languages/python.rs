//! Python language analyzer using tree-sitter.

use std::path::Path;

use phf::phf_set;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language as Grammar, Node, Parser, Query, QueryCursor};

use super::{strip_extension, unique_suffix_match};
use crate::analysis::facts::{Decision, ImportedSymbol, RawBase, RawImport, BaseRelation, Receiver};
use crate::analysis::traits::{Extraction, LanguageAnalyzer, ModuleLookup, ParsedFile};
use crate::analysis::walker::{
    self, field_text, line_of, named_children, simple_type_name, text, CallArg, CallShape,
    DefContext, Definition, SyntaxRules,
};
use crate::analysis::FileFacts;
use crate::model::EntityKind;
use crate::scanner::Language;

/// Tree-sitter query for extracting imports.
const IMPORT_QUERY: &str = r#"
(import_statement) @import
(import_from_statement) @import_from
"#;

/// Names resolved by the interpreter rather than by the project.
static BUILTINS: phf::Set<&'static str> = phf_set! {
    "abs", "all", "any", "bool", "bytes", "callable", "chr", "dict", "dir",
    "enumerate", "filter", "float", "format", "frozenset", "getattr", "hasattr",
    "hash", "id", "input", "int", "isinstance", "issubclass", "iter", "len",
    "list", "map", "max", "min", "next", "object", "open", "ord", "print",
    "property", "range", "repr", "reversed", "round", "set", "setattr",
    "sorted", "staticmethod", "classmethod", "str", "sum", "tuple", "type",
    "vars", "zip", "super", "Exception", "ValueError", "TypeError",
    "KeyError", "RuntimeError", "NotImplementedError",
};

const SELF_NAMES: [&str; 2] = ["self", "cls"];

pub struct PythonAnalyzer {
    grammar: Grammar,
}

impl PythonAnalyzer {
    pub fn new() -> Self {
        Self {
            grammar: tree_sitter_python::LANGUAGE.into(),
        }
    }

    fn create_parser(&self) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.grammar)?;
        Ok(parser)
    }

    fn import_statement(&self, parsed: &ParsedFile, node: Node, imports: &mut Vec<RawImport>) {
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let (module, alias) = match name.kind() {
                "aliased_import" => (
                    field_text(name, "name", &parsed.source).unwrap_or(""),
                    field_text(name, "alias", &parsed.source),
                ),
                _ => (parsed.node_text(name), None),
            };
            if module.is_empty() {
                continue;
            }
            let mut import = RawImport::new(module, line_of(node));
            // `import a.b` makes `a.b.x` reachable under the full dotted name
            import.alias = Some(alias.unwrap_or(module).to_string());
            imports.push(import);
        }
    }

    fn import_from_statement(&self, parsed: &ParsedFile, node: Node, imports: &mut Vec<RawImport>) {
        let Some(module) = field_text(node, "module_name", &parsed.source) else {
            return;
        };
        let mut import = RawImport::new(module, line_of(node));
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            match name.kind() {
                "aliased_import" => {
                    if let Some(symbol) = field_text(name, "name", &parsed.source) {
                        import.symbols.push(ImportedSymbol {
                            name: symbol.to_string(),
                            alias: field_text(name, "alias", &parsed.source).map(str::to_string),
                            owner: None,
                        });
                    }
                }
                _ => import
                    .symbols
                    .push(ImportedSymbol::named(parsed.node_text(name))),
            }
        }
        import.wildcard = named_children(node)
            .iter()
            .any(|c| c.kind() == "wildcard_import");
        imports.push(import);
    }
}

impl Default for PythonAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for PythonAnalyzer {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse Python source: {}", path.display()))?;

        Ok(ParsedFile {
            tree,
            source: source.to_vec(),
            path: super::display_path(path),
        })
    }

    fn module_name(&self, parsed: &ParsedFile) -> String {
        let dotted = strip_extension(&parsed.path).replace('/', ".");
        match dotted.strip_suffix(".__init__") {
            Some(package) => package.to_string(),
            None => dotted,
        }
    }

    fn extract(&self, parsed: &ParsedFile) -> anyhow::Result<Extraction> {
        let module = self.module_name(parsed);
        Ok(walker::walk(parsed, &PythonRules, &module))
    }

    fn extract_imports(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<RawImport>> {
        let query = Query::new(&self.grammar, IMPORT_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut imports = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                match query.capture_names()[capture.index as usize] {
                    "import" => self.import_statement(parsed, capture.node, &mut imports),
                    "import_from" => self.import_from_statement(parsed, capture.node, &mut imports),
                    _ => {}
                }
            }
        }

        imports.sort_by_key(|i| i.line);
        Ok(imports)
    }

    fn resolve_module(
        &self,
        specifier: &str,
        importer: &FileFacts,
        modules: &dyn ModuleLookup,
    ) -> Option<String> {
        let dots = specifier.chars().take_while(|c| *c == '.').count();
        if dots == 0 {
            if modules.contains(specifier) {
                return Some(specifier.to_string());
            }
            return unique_suffix_match(modules, specifier, '.');
        }

        let mut package: Vec<&str> = importer.module.split('.').filter(|s| !s.is_empty()).collect();
        let is_package_init = importer.path.ends_with("__init__.py")
            || importer.path.ends_with("__init__.pyi");
        if !is_package_init {
            package.pop();
        }
        for _ in 1..dots {
            package.pop()?;
        }
        let rest = &specifier[dots..];
        if !rest.is_empty() {
            package.push(rest);
        }
        let target = package.join(".");
        modules.contains(&target).then_some(target)
    }

    fn submodule_name(&self, module: &str, symbol: &str) -> Option<String> {
        if module.is_empty() {
            Some(symbol.to_string())
        } else {
            Some(format!("{}.{}", module, symbol))
        }
    }

    fn constructor_names(&self, _type_name: &str) -> Vec<String> {
        vec!["__init__".to_string()]
    }

    fn is_builtin(&self, name: &str) -> bool {
        BUILTINS.contains(name)
    }
}

struct PythonRules;

impl PythonRules {
    /// `a.b.c` for chains of identifiers and attributes.
    fn dotted(node: Node, src: &[u8]) -> Option<String> {
        match node.kind() {
            "identifier" => Some(text(node, src).to_string()),
            "attribute" => {
                let object = node.child_by_field_name("object")?;
                let attr = node.child_by_field_name("attribute")?;
                Some(format!("{}.{}", Self::dotted(object, src)?, text(attr, src)))
            }
            _ => None,
        }
    }

    fn receiver(object: Node, src: &[u8]) -> Receiver {
        match object.kind() {
            "identifier" if SELF_NAMES.contains(&text(object, src)) => Receiver::SelfRef,
            "call" => {
                let function = object.child_by_field_name("function");
                match function {
                    Some(f) if f.kind() == "identifier" && text(f, src) == "super" => Receiver::Super,
                    Some(f) => match Self::dotted(f, src) {
                        Some(path) => Receiver::Construct(path),
                        None => Receiver::Expr,
                    },
                    None => Receiver::Expr,
                }
            }
            _ => match Self::dotted(object, src) {
                Some(path) => Receiver::Path(path),
                None => Receiver::Expr,
            },
        }
    }

    fn parameters(node: Node, src: &[u8], skip_self: bool) -> (usize, Vec<(String, String)>) {
        let Some(params) = node.child_by_field_name("parameters") else {
            return (0, Vec::new());
        };
        let mut count = 0;
        let mut bindings = Vec::new();
        for (i, param) in named_children(params).into_iter().enumerate() {
            let (name, ty) = match param.kind() {
                "identifier" => (Some(text(param, src)), None),
                "typed_parameter" => (
                    named_children(param)
                        .into_iter()
                        .find(|c| c.kind() == "identifier")
                        .map(|c| text(c, src)),
                    field_text(param, "type", src),
                ),
                "default_parameter" => (field_text(param, "name", src), None),
                "typed_default_parameter" => {
                    (field_text(param, "name", src), field_text(param, "type", src))
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => (Some(""), None),
                _ => (None, None),
            };
            let Some(name) = name else {
                continue;
            };
            if i == 0 && skip_self && SELF_NAMES.contains(&name) {
                continue;
            }
            count += 1;
            if let Some(ty) = ty.and_then(simple_type_name) {
                if !name.is_empty() {
                    bindings.push((name.to_string(), ty));
                }
            }
        }
        (count, bindings)
    }

    fn is_docstring(node: Node) -> bool {
        if node.kind() != "expression_statement" || node.named_child_count() != 1 {
            return false;
        }
        if node.named_child(0).map(|c| c.kind()) != Some("string") {
            return false;
        }
        let mut prev = node.prev_named_sibling();
        while let Some(p) = prev {
            if p.kind() != "comment" {
                return false;
            }
            prev = p.prev_named_sibling();
        }
        match node.parent() {
            Some(p) if p.kind() == "module" => true,
            Some(p) if p.kind() == "block" => p
                .parent()
                .is_some_and(|g| matches!(g.kind(), "function_definition" | "class_definition")),
            _ => false,
        }
    }

    fn assigned_names<'t>(left: Node<'t>, src: &[u8]) -> Vec<(String, Node<'t>)> {
        match left.kind() {
            "identifier" => vec![(text(left, src).to_string(), left)],
            "pattern_list" | "tuple_pattern" => named_children(left)
                .into_iter()
                .filter(|c| c.kind() == "identifier")
                .map(|c| (text(c, src).to_string(), c))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

impl SyntaxRules for PythonRules {
    fn definitions<'t>(&self, node: Node<'t>, src: &[u8], ctx: DefContext) -> Vec<Definition<'t>> {
        match node.kind() {
            "function_definition" => {
                let Some(name) = field_text(node, "name", src) else {
                    return Vec::new();
                };
                let (count, bindings) = Self::parameters(node, src, ctx.in_type);
                let mut def = Definition::new(EntityKind::Function, name, node);
                def.parameter_count = count;
                def.bindings = bindings;
                vec![def]
            }
            "class_definition" => {
                let Some(name) = field_text(node, "name", src) else {
                    return Vec::new();
                };
                let mut def = Definition::new(EntityKind::Class, name, node);
                if let Some(supers) = node.child_by_field_name("superclasses") {
                    for base in named_children(supers) {
                        if let Some(path) = Self::dotted(base, src) {
                            def.bases.push(RawBase {
                                name: path,
                                relation: BaseRelation::Extends,
                            });
                        }
                    }
                }
                vec![def]
            }
            "expression_statement" if ctx.at_module => {
                let Some(assignment) = node.named_child(0).filter(|c| c.kind() == "assignment")
                else {
                    return Vec::new();
                };
                let Some(left) = assignment.child_by_field_name("left") else {
                    return Vec::new();
                };
                Self::assigned_names(left, src)
                    .into_iter()
                    .map(|(name, _)| {
                        let kind = if is_constant_name(&name) {
                            EntityKind::Constant
                        } else {
                            EntityKind::Variable
                        };
                        Definition::new(kind, name, node)
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn call(&self, node: Node, src: &[u8]) -> Option<CallShape> {
        if node.kind() != "call" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        let (callee, receiver, line) = match function.kind() {
            "identifier" => {
                let name = text(function, src);
                if name == "super" {
                    return None;
                }
                (name.to_string(), Receiver::None, line_of(function))
            }
            "attribute" => {
                let attr = function.child_by_field_name("attribute")?;
                let object = function.child_by_field_name("object")?;
                (
                    text(attr, src).to_string(),
                    Self::receiver(object, src),
                    line_of(attr),
                )
            }
            _ => return None,
        };

        let mut args = Vec::new();
        if let Some(arguments) = node.child_by_field_name("arguments") {
            for arg in named_children(arguments) {
                let value = if arg.kind() == "keyword_argument" {
                    match arg.child_by_field_name("value") {
                        Some(v) => v,
                        None => continue,
                    }
                } else {
                    arg
                };
                match value.kind() {
                    "identifier" => {
                        let name = text(value, src);
                        if !SELF_NAMES.contains(&name) {
                            args.push(CallArg {
                                name: name.to_string(),
                                receiver: Receiver::None,
                            });
                        }
                    }
                    "attribute" => {
                        let object = value.child_by_field_name("object");
                        let attr = value.child_by_field_name("attribute");
                        if let (Some(object), Some(attr)) = (object, attr) {
                            if object.kind() == "identifier"
                                && SELF_NAMES.contains(&text(object, src))
                            {
                                args.push(CallArg {
                                    name: text(attr, src).to_string(),
                                    receiver: Receiver::SelfRef,
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        Some(CallShape {
            callee,
            receiver,
            line,
            args,
        })
    }

    fn decision(&self, node: Node, src: &[u8]) -> Option<Decision> {
        match node.kind() {
            "if_statement" | "elif_clause" => Some(Decision::If),
            "for_statement" | "while_statement" => Some(Decision::Loop),
            "conditional_expression" => Some(Decision::Ternary),
            "case_clause" => Some(Decision::Case),
            "except_clause" => Some(Decision::Catch),
            "boolean_operator" => match field_text(node, "operator", src) {
                Some("and") => Some(Decision::And),
                Some("or") => Some(Decision::Or),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_comment(&self, node: Node, _src: &[u8]) -> bool {
        node.kind() == "comment" || Self::is_docstring(node)
    }

    fn bindings(&self, node: Node, src: &[u8]) -> Vec<(String, String)> {
        if node.kind() != "assignment" {
            return Vec::new();
        }
        let Some(left) = node.child_by_field_name("left").filter(|l| l.kind() == "identifier")
        else {
            return Vec::new();
        };
        let var = text(left, src).to_string();
        if let Some(ty) = field_text(node, "type", src).and_then(simple_type_name) {
            return vec![(var, ty)];
        }
        let constructed = node
            .child_by_field_name("right")
            .filter(|r| r.kind() == "call")
            .and_then(|r| r.child_by_field_name("function"))
            .and_then(|f| Self::dotted(f, src));
        match constructed {
            Some(ty) => vec![(var, ty)],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn parse_python(path: &str, source: &str) -> (PythonAnalyzer, ParsedFile) {
        let analyzer = PythonAnalyzer::new();
        let parsed = analyzer.parse(Path::new(path), source.as_bytes()).unwrap();
        (analyzer, parsed)
    }

    #[test]
    fn test_extract_imports() {
        let source = r#"
import os
import numpy as np
from collections import OrderedDict
from typing import List, Optional as Opt
from . import local_module
from .models import *
"#;
        let (analyzer, parsed) = parse_python("pkg/a.py", source);
        let imports = analyzer.extract_imports(&parsed).unwrap();

        assert_eq!(imports.len(), 6);
        assert_eq!(imports[0].module, "os");
        assert_eq!(imports[0].alias.as_deref(), Some("os"));
        assert_eq!(imports[1].alias.as_deref(), Some("np"));
        assert_eq!(imports[2].symbols[0].name, "OrderedDict");
        assert_eq!(imports[3].symbols[1].local_name(), "Opt");
        assert_eq!(imports[4].module, ".");
        assert_eq!(imports[4].symbols[0].name, "local_module");
        assert!(imports[5].wildcard);
        assert_eq!(imports[5].module, ".models");
    }

    #[test]
    fn test_extract_entities() {
        let source = r#"
MAX_SIZE = 10
registry = {}

def simple():
    pass

class Base:
    def run(self, x, y=1):
        return x

class Child(Base, mixins.Loggable):
    def run(self):
        def helper():
            pass
        return helper()
"#;
        let (analyzer, parsed) = parse_python("pkg/mod.py", source);
        let entities = analyzer.extract_entities(&parsed).unwrap();

        let names: Vec<_> = entities
            .iter()
            .map(|e| (e.kind, e.qualified_name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                (EntityKind::Module, "pkg.mod"),
                (EntityKind::Constant, "MAX_SIZE"),
                (EntityKind::Variable, "registry"),
                (EntityKind::Function, "simple"),
                (EntityKind::Class, "Base"),
                (EntityKind::Method, "Base.run"),
                (EntityKind::Class, "Child"),
                (EntityKind::Method, "Child.run"),
                (EntityKind::Function, "Child.run.helper"),
            ]
        );
        assert_eq!(entities[5].parameter_count, 2);
        assert_eq!(entities[5].parent, Some(4));
        assert_eq!(entities[6].bases.len(), 2);
        assert_eq!(entities[6].bases[1].name, "mixins.Loggable");
    }

    #[test]
    fn test_call_sites_and_receivers() {
        let source = r#"
class Svc(Base):
    def go(self, repo: Repo):
        self.helper()
        super().go()
        repo.save()
        x = Worker()
        x.work()
        Worker().work()
        util.tools.run(callback)
"#;
        let (analyzer, parsed) = parse_python("svc.py", source);
        let calls = analyzer.extract_call_sites(&parsed).unwrap();

        let find = |name: &str| calls.iter().find(|c| c.callee == name && !c.callback).unwrap();
        assert_eq!(find("helper").receiver, Receiver::SelfRef);
        assert_eq!(find("go").receiver, Receiver::Super);
        assert_eq!(find("save").receiver_type.as_deref(), Some("Repo"));
        assert_eq!(
            calls.iter().filter(|c| c.callee == "work").count(),
            2
        );
        let work: Vec<_> = calls.iter().filter(|c| c.callee == "work").collect();
        assert_eq!(work[0].receiver_type.as_deref(), Some("Worker"));
        assert_eq!(work[1].receiver, Receiver::Construct("Worker".to_string()));
        assert_eq!(find("run").receiver, Receiver::Path("util.tools".to_string()));
        assert!(calls.iter().any(|c| c.callee == "callback" && c.callback));
        // every call is attributed to the method
        assert!(calls.iter().all(|c| c.caller == 2));
    }

    #[test]
    fn test_control_flow() {
        let source = r#"
def branchy(a, b):
    if a and b:
        return 1
    elif a or b:
        return 2
    for i in range(3):
        try:
            pass
        except ValueError:
            pass
    return 3 if a else 4

def flat():
    return 0
"#;
        let (analyzer, parsed) = parse_python("cf.py", source);
        let entities = analyzer.extract_entities(&parsed).unwrap();
        let branchy = entities.iter().find(|e| e.name == "branchy").unwrap();
        // if, elif, and, or, for, except, ternary
        assert_eq!(branchy.control_flow.unwrap().cyclomatic_complexity(), 8);
        let flat = entities.iter().find(|e| e.name == "flat").unwrap();
        assert_eq!(flat.control_flow.unwrap().cyclomatic_complexity(), 1);
    }

    #[test]
    fn test_line_stats() {
        let source = "\"\"\"Module docstring.\"\"\"\n\n# comment\nx = 1  # trailing\n\ndef f():\n    \"\"\"Doc.\n\n    More.\n    \"\"\"\n    return x\n";
        let (analyzer, parsed) = parse_python("lines.py", source);
        let facts = analyzer.extract_facts(&parsed).unwrap();
        assert_eq!(facts.lines.total, 11);
        assert_eq!(facts.lines.code, 3);
        assert_eq!(facts.lines.comment, 6);
        assert_eq!(facts.lines.blank, 2);
    }

    #[test]
    fn test_module_names() {
        let analyzer = PythonAnalyzer::new();
        let parsed = analyzer.parse(Path::new("pkg/sub/__init__.py"), b"").unwrap();
        assert_eq!(analyzer.module_name(&parsed), "pkg.sub");
        let parsed = analyzer.parse(Path::new("pkg/a.py"), b"").unwrap();
        assert_eq!(analyzer.module_name(&parsed), "pkg.a");
    }

    #[test]
    fn test_resolve_module() {
        let analyzer = PythonAnalyzer::new();
        let modules: BTreeSet<String> = ["pkg", "pkg.a", "pkg.b", "src.lib.util"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let importer = FileFacts::empty("pkg/a.py", Language::Python, "pkg.a");

        assert_eq!(
            analyzer.resolve_module(".b", &importer, &modules),
            Some("pkg.b".to_string())
        );
        assert_eq!(
            analyzer.resolve_module(".", &importer, &modules),
            Some("pkg".to_string())
        );
        assert_eq!(
            analyzer.resolve_module("pkg.b", &importer, &modules),
            Some("pkg.b".to_string())
        );
        assert_eq!(
            analyzer.resolve_module("lib.util", &importer, &modules),
            Some("src.lib.util".to_string())
        );
        assert_eq!(analyzer.resolve_module("os", &importer, &modules), None);
        assert_eq!(analyzer.resolve_module("...x", &importer, &modules), None);

        let init = FileFacts::empty("pkg/__init__.py", Language::Python, "pkg");
        assert_eq!(
            analyzer.resolve_module(".a", &init, &modules),
            Some("pkg.a".to_string())
        );
    }

    #[test]
    fn test_syntax_error_drops_entities() {
        let source = "def ok():\n    pass\n\ndef broken(:\n    pass\n";
        let (analyzer, parsed) = parse_python("bad.py", source);
        let facts = analyzer.extract_facts(&parsed).unwrap();
        assert!(facts
            .parse_error
            .as_deref()
            .is_some_and(|m| m.starts_with("syntax error at line ")));
        assert!(facts.entities.is_empty());
        assert!(facts.call_sites.is_empty());
        assert_eq!(facts.module, "bad");
        assert_eq!(facts.lines.code, 4);
    }
}
