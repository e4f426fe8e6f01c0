//! Go language analyzer using tree-sitter.
//!
//! Extracts:
//! - Function declarations and methods with receivers
//! - Struct and interface types with their embedded types
//! - Module-level constants and variables
//! - Imports, keyed by import path
//! - Control flow for complexity

use std::collections::HashSet;
use std::path::Path;

use phf::phf_set;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language as Grammar, Node, Parser, Query, QueryCursor};

use crate::analysis::facts::{BaseRelation, Decision, RawBase, RawImport, Receiver};
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
(import_declaration
  (import_spec
    name: (_)? @alias
    path: (interpreted_string_literal) @path
  )
) @import

(import_declaration
  (import_spec_list
    (import_spec
      name: (_)? @alias
      path: (interpreted_string_literal) @path
    ) @import_item
  )
) @import_group
"#;

/// Tree-sitter query for package declaration.
const PACKAGE_QUERY: &str = r#"
(package_clause
  (package_identifier) @package_name
)
"#;

/// Predeclared functions.
static BUILTINS: phf::Set<&'static str> = phf_set! {
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag",
    "len", "make", "max", "min", "new", "panic", "print", "println", "real",
    "recover",
};

pub struct GoAnalyzer {
    grammar: Grammar,
}

impl GoAnalyzer {
    pub fn new() -> Self {
        Self {
            grammar: tree_sitter_go::LANGUAGE.into(),
        }
    }

    fn create_parser(&self) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.grammar)?;
        Ok(parser)
    }

    fn extract_package(&self, parsed: &ParsedFile) -> Option<String> {
        let query = Query::new(&self.grammar, PACKAGE_QUERY).ok()?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        if let Some(m) = matches.next() {
            for capture in m.captures {
                let name = query.capture_names()[capture.index as usize];
                if name == "package_name" {
                    return Some(parsed.node_text(capture.node).to_string());
                }
            }
        }
        None
    }
}

impl Default for GoAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for GoAnalyzer {
    fn language(&self) -> Language {
        Language::Go
    }

    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse Go source: {}", path.display()))?;

        Ok(ParsedFile {
            tree,
            source: source.to_vec(),
            path: super::display_path(path),
        })
    }

    /// The package directory. Files at the project root use the package name.
    fn module_name(&self, parsed: &ParsedFile) -> String {
        match parsed.path.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => self
                .extract_package(parsed)
                .unwrap_or_else(|| "main".to_string()),
        }
    }

    fn package_name(&self, parsed: &ParsedFile) -> Option<String> {
        self.extract_package(parsed)
    }

    fn extract(&self, parsed: &ParsedFile) -> anyhow::Result<Extraction> {
        let module = self.module_name(parsed);
        Ok(walker::walk(parsed, &GoRules, &module))
    }

    fn extract_imports(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<RawImport>> {
        let query = Query::new(&self.grammar, IMPORT_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut imports = Vec::new();
        let mut seen_paths = HashSet::new();

        while let Some(m) = matches.next() {
            let mut path = String::new();
            let mut alias = None;
            let mut line = 0;

            for capture in m.captures {
                let name = query.capture_names()[capture.index as usize];
                match name {
                    "path" => {
                        path = parsed.node_text(capture.node).trim_matches('"').to_string();
                        line = line_of(capture.node);
                    }
                    "alias" => alias = Some(parsed.node_text(capture.node).to_string()),
                    _ => {}
                }
            }

            if path.is_empty() || !seen_paths.insert(path.clone()) {
                continue;
            }
            let mut import = RawImport::new(path.as_str(), line);
            match alias.as_deref() {
                Some(".") => import.wildcard = true,
                Some("_") => {}
                Some(name) => import.alias = Some(name.to_string()),
                None => {
                    let last = path.rsplit('/').next().unwrap_or(&path);
                    import.alias = Some(last.to_string());
                }
            }
            imports.push(import);
        }

        imports.sort_by_key(|i| i.line);
        Ok(imports)
    }

    /// Import paths name a directory; the longest module directory the path
    /// ends with wins.
    fn resolve_module(
        &self,
        specifier: &str,
        _importer: &FileFacts,
        modules: &dyn ModuleLookup,
    ) -> Option<String> {
        modules
            .module_names()
            .into_iter()
            .filter(|m| {
                !m.is_empty()
                    && (specifier == *m
                        || specifier
                            .strip_suffix(*m)
                            .is_some_and(|prefix| prefix.ends_with('/')))
            })
            .max_by_key(|m| m.len())
            .map(str::to_string)
    }

    fn constructor_names(&self, _type_name: &str) -> Vec<String> {
        Vec::new()
    }

    fn is_builtin(&self, name: &str) -> bool {
        BUILTINS.contains(name)
    }
}

struct GoRules;

impl GoRules {
    fn dotted(node: Node, src: &[u8]) -> Option<String> {
        match node.kind() {
            "identifier" | "package_identifier" | "field_identifier" => {
                Some(text(node, src).to_string())
            }
            "selector_expression" => {
                let operand = node.child_by_field_name("operand")?;
                let field = node.child_by_field_name("field")?;
                Some(format!("{}.{}", Self::dotted(operand, src)?, text(field, src)))
            }
            _ => None,
        }
    }

    /// Type named by a composite literal, `X{}` or `&X{}`.
    fn literal_type(node: Node, src: &[u8]) -> Option<String> {
        match node.kind() {
            "composite_literal" => field_text(node, "type", src).and_then(simple_type_name),
            "unary_expression" if field_text(node, "operator", src) == Some("&") => node
                .child_by_field_name("operand")
                .and_then(|o| Self::literal_type(o, src)),
            _ => None,
        }
    }

    fn parameters(list: Option<Node>, src: &[u8]) -> (usize, Vec<(String, String)>) {
        let Some(list) = list else {
            return (0, Vec::new());
        };
        let mut count = 0;
        let mut bindings = Vec::new();
        for param in named_children(list) {
            if !matches!(
                param.kind(),
                "parameter_declaration" | "variadic_parameter_declaration"
            ) {
                continue;
            }
            let ty = field_text(param, "type", src).and_then(simple_type_name);
            let mut cursor = param.walk();
            let names: Vec<Node> = param.children_by_field_name("name", &mut cursor).collect();
            // `func(int, string)` declares unnamed parameters
            count += names.len().max(1);
            if let Some(ty) = ty {
                for name in names {
                    bindings.push((text(name, src).to_string(), ty.clone()));
                }
            }
        }
        (count, bindings)
    }

    fn receiver(node: Node, src: &[u8]) -> Option<(String, Option<String>)> {
        let list = node.child_by_field_name("receiver")?;
        let param = named_children(list)
            .into_iter()
            .find(|p| p.kind() == "parameter_declaration")?;
        let ty = field_text(param, "type", src).and_then(simple_type_name)?;
        let name = field_text(param, "name", src).map(str::to_string);
        Some((ty, name))
    }

    fn embedded(body: Node, src: &[u8]) -> Vec<RawBase> {
        let mut bases = Vec::new();
        for child in named_children(body) {
            let ty = match child.kind() {
                "field_declaration" if child.child_by_field_name("name").is_none() => {
                    field_text(child, "type", src)
                }
                "type_elem" => {
                    let parts = named_children(child);
                    match parts.as_slice() {
                        [single] => Some(text(*single, src)),
                        _ => None,
                    }
                }
                _ => None,
            };
            if let Some(name) = ty.and_then(simple_type_name) {
                bases.push(RawBase {
                    name,
                    relation: BaseRelation::Extends,
                });
            }
        }
        bases
    }

    fn type_spec<'t>(node: Node<'t>, src: &[u8]) -> Option<Definition<'t>> {
        let name = field_text(node, "name", src)?;
        let ty = node.child_by_field_name("type")?;
        let kind = match ty.kind() {
            "struct_type" => EntityKind::Struct,
            "interface_type" => EntityKind::Interface,
            _ => return None,
        };
        let body = match kind {
            EntityKind::Struct => named_children(ty)
                .into_iter()
                .find(|c| c.kind() == "field_declaration_list"),
            _ => Some(ty),
        };
        let mut def = Definition::new(kind, name, node);
        def.bases = body.map(|b| Self::embedded(b, src)).unwrap_or_default();
        Some(def)
    }

    fn spec_names<'t>(node: Node<'t>, src: &[u8], kind: EntityKind) -> Vec<Definition<'t>> {
        let mut cursor = node.walk();
        node.children_by_field_name("name", &mut cursor)
            .map(|name| Definition::new(kind, text(name, src), node))
            .collect()
    }
}

impl SyntaxRules for GoRules {
    fn definitions<'t>(&self, node: Node<'t>, src: &[u8], ctx: DefContext) -> Vec<Definition<'t>> {
        match node.kind() {
            "function_declaration" => {
                let Some(name) = field_text(node, "name", src) else {
                    return Vec::new();
                };
                let mut def = Definition::new(EntityKind::Function, name, node);
                let (count, bindings) =
                    Self::parameters(node.child_by_field_name("parameters"), src);
                def.parameter_count = count;
                def.bindings = bindings;
                vec![def]
            }
            "method_declaration" => {
                let Some(name) = field_text(node, "name", src) else {
                    return Vec::new();
                };
                let mut def = Definition::new(EntityKind::Method, name, node);
                let (count, mut bindings) =
                    Self::parameters(node.child_by_field_name("parameters"), src);
                if let Some((owner, receiver)) = Self::receiver(node, src) {
                    if let Some(receiver) = receiver {
                        bindings.push((receiver, owner.clone()));
                    }
                    def.owner_hint = Some(owner);
                }
                def.parameter_count = count;
                def.bindings = bindings;
                vec![def]
            }
            "type_spec" => Self::type_spec(node, src).into_iter().collect(),
            "const_spec" if ctx.at_module => Self::spec_names(node, src, EntityKind::Constant),
            "var_spec" if ctx.at_module => Self::spec_names(node, src, EntityKind::Variable),
            _ => Vec::new(),
        }
    }

    fn call(&self, node: Node, src: &[u8]) -> Option<CallShape> {
        if node.kind() != "call_expression" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        let (callee, receiver) = match function.kind() {
            "identifier" => (text(function, src).to_string(), Receiver::None),
            "selector_expression" => {
                let operand = function.child_by_field_name("operand")?;
                let field = function.child_by_field_name("field")?;
                let receiver = match Self::literal_type(operand, src) {
                    Some(ty) => Receiver::Construct(ty),
                    None => Self::dotted(operand, src)
                        .map(Receiver::Path)
                        .unwrap_or(Receiver::Expr),
                };
                (text(field, src).to_string(), receiver)
            }
            _ => return None,
        };
        let args = node
            .child_by_field_name("arguments")
            .map(|a| {
                named_children(a)
                    .into_iter()
                    .filter_map(|arg| match arg.kind() {
                        "identifier" => Some(CallArg {
                            name: text(arg, src).to_string(),
                            receiver: Receiver::None,
                        }),
                        "selector_expression" => {
                            let operand = arg.child_by_field_name("operand")?;
                            let field = arg.child_by_field_name("field")?;
                            Some(CallArg {
                                name: text(field, src).to_string(),
                                receiver: Receiver::Path(Self::dotted(operand, src)?),
                            })
                        }
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(CallShape {
            callee,
            receiver,
            line: line_of(function),
            args,
        })
    }

    fn decision(&self, node: Node, src: &[u8]) -> Option<Decision> {
        match node.kind() {
            "if_statement" => Some(Decision::If),
            "for_statement" => Some(Decision::Loop),
            "expression_case" | "type_case" | "communication_case" => Some(Decision::Case),
            "binary_expression" => match field_text(node, "operator", src) {
                Some("&&") => Some(Decision::And),
                Some("||") => Some(Decision::Or),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_comment(&self, node: Node, _src: &[u8]) -> bool {
        node.kind() == "comment"
    }

    fn bindings(&self, node: Node, src: &[u8]) -> Vec<(String, String)> {
        match node.kind() {
            "short_var_declaration" => {
                let (Some(left), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) else {
                    return Vec::new();
                };
                named_children(left)
                    .into_iter()
                    .zip(named_children(right))
                    .filter_map(|(var, value)| {
                        let ty = Self::literal_type(value, src)?;
                        Some((text(var, src).to_string(), ty))
                    })
                    .collect()
            }
            "var_spec" => {
                let ty = field_text(node, "type", src).and_then(simple_type_name);
                let Some(ty) = ty else {
                    return Vec::new();
                };
                let mut cursor = node.walk();
                node.children_by_field_name("name", &mut cursor)
                    .map(|name| (text(name, src).to_string(), ty.clone()))
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn parse_go(path: &str, source: &str) -> (GoAnalyzer, ParsedFile) {
        let analyzer = GoAnalyzer::new();
        let parsed = analyzer.parse(Path::new(path), source.as_bytes()).unwrap();
        (analyzer, parsed)
    }

    const SERVER: &str = r#"package server

import (
	"fmt"
	log "github.com/sirupsen/logrus"
	_ "net/http/pprof"
	"example.com/app/internal/store"
)

const MaxConns = 10

var registry = map[string]int{}

type Base struct{}

type Server struct {
	Base
	*Logger
	name string
}

type Handler interface {
	Named
	Handle(req string) error
}

func NewServer(name string) *Server {
	s := &Server{name: name}
	return s
}

// Run starts the server.
func (s *Server) Run(port int, verbose bool) error {
	if port == 0 || verbose {
		fmt.Println("bad port")
	}
	for i := 0; i < 3; i++ {
		s.handle(i)
	}
	st := store.Open()
	log.Info(st)
	go s.loop(s.handle)
	return nil
}

func (s Server) handle(n int) {
	switch n {
	case 1:
	case 2:
	default:
	}
}
"#;

    #[test]
    fn test_imports() {
        let (analyzer, parsed) = parse_go("internal/server/server.go", SERVER);
        let imports = analyzer.extract_imports(&parsed).unwrap();
        let modules: Vec<_> = imports.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(
            modules,
            vec![
                "fmt",
                "github.com/sirupsen/logrus",
                "net/http/pprof",
                "example.com/app/internal/store"
            ]
        );
        assert_eq!(imports[0].alias.as_deref(), Some("fmt"));
        assert_eq!(imports[1].alias.as_deref(), Some("log"));
        assert_eq!(imports[2].alias, None);
        assert_eq!(imports[3].alias.as_deref(), Some("store"));
    }

    #[test]
    fn test_entities() {
        let (analyzer, parsed) = parse_go("internal/server/server.go", SERVER);
        let facts = analyzer.extract_facts(&parsed).unwrap();
        assert_eq!(facts.module, "internal/server");
        assert_eq!(facts.package.as_deref(), Some("server"));

        let names: Vec<_> = facts
            .entities
            .iter()
            .map(|e| (e.kind, e.qualified_name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                (EntityKind::Module, "internal/server"),
                (EntityKind::Constant, "MaxConns"),
                (EntityKind::Variable, "registry"),
                (EntityKind::Struct, "Base"),
                (EntityKind::Struct, "Server"),
                (EntityKind::Interface, "Handler"),
                (EntityKind::Function, "NewServer"),
                (EntityKind::Method, "Server.Run"),
                (EntityKind::Method, "Server.handle"),
            ]
        );

        let server = &facts.entities[4];
        let bases: Vec<_> = server.bases.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(bases, vec!["Base", "Logger"]);
        assert_eq!(facts.entities[5].bases[0].name, "Named");

        let run = &facts.entities[7];
        assert_eq!(run.owner_hint.as_deref(), Some("Server"));
        assert_eq!(run.parameter_count, 2);
        // if, ||, for
        assert_eq!(run.control_flow.unwrap().cyclomatic_complexity(), 4);
        // two expression cases
        assert_eq!(
            facts.entities[8].control_flow.unwrap().cyclomatic_complexity(),
            3
        );
    }

    #[test]
    fn test_call_sites() {
        let (analyzer, parsed) = parse_go("internal/server/server.go", SERVER);
        let calls = analyzer.extract_call_sites(&parsed).unwrap();

        let handle = calls.iter().find(|c| c.callee == "handle" && !c.callback).unwrap();
        assert_eq!(handle.receiver, Receiver::Path("s".to_string()));
        assert_eq!(handle.receiver_type.as_deref(), Some("Server"));
        assert_eq!(handle.caller, 7);

        let open = calls.iter().find(|c| c.callee == "Open").unwrap();
        assert_eq!(open.receiver, Receiver::Path("store".to_string()));
        let println = calls.iter().find(|c| c.callee == "Println").unwrap();
        assert_eq!(println.receiver, Receiver::Path("fmt".to_string()));

        let callback = calls.iter().find(|c| c.callee == "handle" && c.callback).unwrap();
        assert_eq!(callback.receiver, Receiver::Path("s".to_string()));
    }

    #[test]
    fn test_module_name_at_root() {
        let (analyzer, parsed) = parse_go("main.go", "package main\n\nfunc main() {}\n");
        assert_eq!(analyzer.module_name(&parsed), "main");
    }

    #[test]
    fn test_resolve_module() {
        let analyzer = GoAnalyzer::new();
        let modules: BTreeSet<String> = ["internal/store", "store", "cmd/app"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let importer = FileFacts::empty("cmd/app/main.go", Language::Go, "cmd/app");
        assert_eq!(
            analyzer.resolve_module("example.com/app/internal/store", &importer, &modules),
            Some("internal/store".to_string())
        );
        assert_eq!(
            analyzer.resolve_module("example.com/app/store", &importer, &modules),
            Some("store".to_string())
        );
        assert_eq!(analyzer.resolve_module("fmt", &importer, &modules), None);
        assert_eq!(
            analyzer.resolve_module("example.com/app/internal/restore", &importer, &modules),
            None
        );
    }
}
