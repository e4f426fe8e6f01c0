//! Java language analyzer using tree-sitter.

use std::path::Path;

use phf::phf_set;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language as Grammar, Node, Parser, Query, QueryCursor};

use crate::analysis::facts::{
    BaseRelation, Decision, ImportedSymbol, RawBase, RawImport, Receiver, TypeRefKind,
};
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
(import_declaration) @import
"#;

/// Tree-sitter query for package declaration.
const PACKAGE_QUERY: &str = r#"
(package_declaration
  [(scoped_identifier) (identifier)] @package_name
)
"#;

/// Module for files without a package declaration at the source root.
const DEFAULT_PACKAGE: &str = "default";

/// Implicitly imported `java.lang` types and common JDK entry points.
static BUILTINS: phf::Set<&'static str> = phf_set! {
    "System", "String", "Math", "Object", "Objects", "Integer", "Long",
    "Double", "Boolean", "Character", "Thread", "Arrays", "Collections",
    "List", "Map", "Set", "Optional", "Stream", "Collectors",
    "StringBuilder", "Exception", "RuntimeException",
    "IllegalArgumentException", "IllegalStateException",
};

pub struct JavaAnalyzer {
    grammar: Grammar,
}

impl JavaAnalyzer {
    pub fn new() -> Self {
        Self {
            grammar: tree_sitter_java::LANGUAGE.into(),
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

    fn import_declaration(parsed: &ParsedFile, node: Node) -> Option<RawImport> {
        let mut is_static = false;
        let mut wildcard = false;
        let mut path = None;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "static" => is_static = true,
                "asterisk" => wildcard = true,
                "scoped_identifier" | "identifier" => path = Some(parsed.node_text(child)),
                _ => {}
            }
        }
        let segments: Vec<&str> = path?.split('.').collect();
        let line = line_of(node);

        let import = match (wildcard, is_static) {
            (true, false) => {
                let mut import = RawImport::new(segments.join("."), line);
                import.wildcard = true;
                import
            }
            // `import static a.b.C.*` exposes C's members; bind C itself
            (true, true) | (false, false) => {
                let (symbol, package) = segments.split_last()?;
                let mut import = RawImport::new(package_or_default(package), line);
                import.symbols.push(ImportedSymbol::named(*symbol));
                import
            }
            (false, true) => {
                let (member, rest) = segments.split_last()?;
                let (owner, package) = rest.split_last()?;
                let mut import = RawImport::new(package_or_default(package), line);
                import.symbols.push(ImportedSymbol {
                    name: member.to_string(),
                    alias: None,
                    owner: Some(owner.to_string()),
                });
                import
            }
        };
        Some(import)
    }
}

fn package_or_default(segments: &[&str]) -> String {
    if segments.is_empty() {
        DEFAULT_PACKAGE.to_string()
    } else {
        segments.join(".")
    }
}

impl Default for JavaAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for JavaAnalyzer {
    fn language(&self) -> Language {
        Language::Java
    }

    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse Java source: {}", path.display()))?;

        Ok(ParsedFile {
            tree,
            source: source.to_vec(),
            path: super::display_path(path),
        })
    }

    /// The declared package; files without one fall back to their directory.
    fn module_name(&self, parsed: &ParsedFile) -> String {
        if let Some(package) = self.extract_package(parsed) {
            return package;
        }
        match parsed.path.rsplit_once('/') {
            Some((dir, _)) => dir.replace('/', "."),
            None => DEFAULT_PACKAGE.to_string(),
        }
    }

    fn package_name(&self, parsed: &ParsedFile) -> Option<String> {
        self.extract_package(parsed)
    }

    fn extract(&self, parsed: &ParsedFile) -> anyhow::Result<Extraction> {
        let module = self.module_name(parsed);
        Ok(walker::walk(parsed, &JavaRules, &module))
    }

    fn extract_imports(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<RawImport>> {
        let query = Query::new(&self.grammar, IMPORT_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut imports = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                if let Some(import) = Self::import_declaration(parsed, capture.node) {
                    imports.push(import);
                }
            }
        }

        imports.sort_by_key(|i| i.line);
        Ok(imports)
    }

    fn resolve_module(
        &self,
        specifier: &str,
        _importer: &FileFacts,
        modules: &dyn ModuleLookup,
    ) -> Option<String> {
        modules
            .contains(specifier)
            .then(|| specifier.to_string())
    }

    fn implicit_member_calls(&self) -> bool {
        true
    }

    fn supports_overloading(&self) -> bool {
        true
    }

    fn constructor_names(&self, type_name: &str) -> Vec<String> {
        vec![type_name.to_string()]
    }

    fn is_builtin(&self, name: &str) -> bool {
        BUILTINS.contains(name)
    }
}

struct JavaRules;

impl JavaRules {
    /// Dotted receiver path; a leading `this.` is dropped so field receivers
    /// resolve through the class's field bindings.
    fn dotted(node: Node, src: &[u8]) -> Option<String> {
        match node.kind() {
            "identifier" => Some(text(node, src).to_string()),
            "field_access" => {
                let object = node.child_by_field_name("object")?;
                let field = node.child_by_field_name("field")?;
                if object.kind() == "this" {
                    return Some(text(field, src).to_string());
                }
                Some(format!("{}.{}", Self::dotted(object, src)?, text(field, src)))
            }
            _ => None,
        }
    }

    /// Class or interface type name, ignoring primitives.
    fn reference_type(node: Node, src: &[u8]) -> Option<String> {
        match node.kind() {
            "type_identifier" | "generic_type" | "scoped_type_identifier" => {
                simple_type_name(text(node, src))
            }
            "array_type" => node
                .child_by_field_name("element")
                .and_then(|e| Self::reference_type(e, src)),
            _ => None,
        }
    }

    fn type_list(node: Node, src: &[u8], relation: BaseRelation, out: &mut Vec<RawBase>) {
        for child in named_children(node) {
            if child.kind() == "type_list" {
                Self::type_list(child, src, relation, out);
            } else if let Some(name) = Self::reference_type(child, src) {
                out.push(RawBase { name, relation });
            }
        }
    }

    fn bases(node: Node, src: &[u8]) -> Vec<RawBase> {
        let mut bases = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "superclass" => Self::type_list(child, src, BaseRelation::Extends, &mut bases),
                "super_interfaces" => {
                    Self::type_list(child, src, BaseRelation::Implements, &mut bases)
                }
                "extends_interfaces" => {
                    Self::type_list(child, src, BaseRelation::Extends, &mut bases)
                }
                _ => {}
            }
        }
        bases
    }

    fn parameters(node: Node, src: &[u8]) -> (usize, Vec<(String, String)>) {
        let Some(params) = node.child_by_field_name("parameters") else {
            return (0, Vec::new());
        };
        let mut count = 0;
        let mut bindings = Vec::new();
        for param in named_children(params) {
            match param.kind() {
                "formal_parameter" => {
                    count += 1;
                    let name = field_text(param, "name", src);
                    let ty = param
                        .child_by_field_name("type")
                        .and_then(|t| Self::reference_type(t, src));
                    if let (Some(name), Some(ty)) = (name, ty) {
                        bindings.push((name.to_string(), ty));
                    }
                }
                "spread_parameter" => count += 1,
                _ => {}
            }
        }
        (count, bindings)
    }

    fn declarator_bindings(node: Node, src: &[u8]) -> Vec<(String, String)> {
        let declared = node
            .child_by_field_name("type")
            .and_then(|t| Self::reference_type(t, src))
            .filter(|t| t != "var");
        let mut cursor = node.walk();
        node.children_by_field_name("declarator", &mut cursor)
            .filter_map(|decl| {
                let name = field_text(decl, "name", src)?;
                let ty = declared.clone().or_else(|| {
                    decl.child_by_field_name("value")
                        .filter(|v| v.kind() == "object_creation_expression")
                        .and_then(|v| v.child_by_field_name("type"))
                        .and_then(|t| Self::reference_type(t, src))
                })?;
                Some((name.to_string(), ty))
            })
            .collect()
    }
}

impl SyntaxRules for JavaRules {
    fn definitions<'t>(&self, node: Node<'t>, src: &[u8], _ctx: DefContext) -> Vec<Definition<'t>> {
        let kind = match node.kind() {
            "class_declaration" | "record_declaration" => EntityKind::Class,
            "interface_declaration" | "annotation_type_declaration" => EntityKind::Interface,
            "enum_declaration" => EntityKind::Enum,
            "method_declaration" | "constructor_declaration" => EntityKind::Function,
            _ => return Vec::new(),
        };
        let Some(name) = field_text(node, "name", src) else {
            return Vec::new();
        };
        let mut def = Definition::new(kind, name, node);
        if kind == EntityKind::Function {
            let (count, bindings) = Self::parameters(node, src);
            def.parameter_count = count;
            def.bindings = bindings;
        } else {
            def.bases = Self::bases(node, src);
        }
        vec![def]
    }

    fn call(&self, node: Node, src: &[u8]) -> Option<CallShape> {
        match node.kind() {
            "method_invocation" => {
                let name = node.child_by_field_name("name")?;
                let receiver = match node.child_by_field_name("object") {
                    None => Receiver::None,
                    Some(object) => match object.kind() {
                        "this" => Receiver::SelfRef,
                        "super" => Receiver::Super,
                        "object_creation_expression" => object
                            .child_by_field_name("type")
                            .and_then(|t| Self::reference_type(t, src))
                            .map(Receiver::Construct)
                            .unwrap_or(Receiver::Expr),
                        _ => Self::dotted(object, src)
                            .map(Receiver::Path)
                            .unwrap_or(Receiver::Expr),
                    },
                };
                let args = node
                    .child_by_field_name("arguments")
                    .map(|a| {
                        named_children(a)
                            .into_iter()
                            .filter(|arg| arg.kind() == "method_reference")
                            .filter_map(|arg| {
                                let parts = named_children(arg);
                                let target = parts.first()?;
                                let method = parts.last().filter(|m| m.kind() == "identifier")?;
                                let receiver = match target.kind() {
                                    "this" => Receiver::SelfRef,
                                    _ => Receiver::Path(text(*target, src).to_string()),
                                };
                                Some(CallArg {
                                    name: text(*method, src).to_string(),
                                    receiver,
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Some(CallShape {
                    callee: text(name, src).to_string(),
                    receiver,
                    line: line_of(name),
                    args,
                })
            }
            "object_creation_expression" => {
                let ty = node.child_by_field_name("type")?;
                let path = Self::reference_type(ty, src)?;
                let (receiver, callee) = match path.rsplit_once('.') {
                    Some((prefix, last)) => (Receiver::Path(prefix.to_string()), last.to_string()),
                    None => (Receiver::None, path),
                };
                Some(CallShape {
                    callee,
                    receiver,
                    line: line_of(ty),
                    args: Vec::new(),
                })
            }
            _ => None,
        }
    }

    fn decision(&self, node: Node, src: &[u8]) -> Option<Decision> {
        match node.kind() {
            "if_statement" => Some(Decision::If),
            "for_statement" | "enhanced_for_statement" | "while_statement" | "do_statement" => {
                Some(Decision::Loop)
            }
            "switch_block_statement_group" | "switch_rule" => Some(Decision::Case),
            "ternary_expression" => Some(Decision::Ternary),
            "catch_clause" => Some(Decision::Catch),
            "binary_expression" => match field_text(node, "operator", src) {
                Some("&&") => Some(Decision::And),
                Some("||") => Some(Decision::Or),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_comment(&self, node: Node, _src: &[u8]) -> bool {
        matches!(node.kind(), "line_comment" | "block_comment")
    }

    fn bindings(&self, node: Node, src: &[u8]) -> Vec<(String, String)> {
        match node.kind() {
            "local_variable_declaration" | "field_declaration" => {
                Self::declarator_bindings(node, src)
            }
            _ => Vec::new(),
        }
    }

    fn type_refs(&self, node: Node, src: &[u8]) -> Vec<(String, TypeRefKind)> {
        let kind = match node.kind() {
            "field_declaration" => TypeRefKind::Field,
            "formal_parameter" => TypeRefKind::Parameter,
            _ => return Vec::new(),
        };
        node.child_by_field_name("type")
            .and_then(|t| Self::reference_type(t, src))
            .map(|ty| vec![(ty, kind)])
            .unwrap_or_default()
    }
}
