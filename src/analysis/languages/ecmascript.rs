//! Syntax rules and import handling shared by the JavaScript and TypeScript
//! analyzers. The TypeScript grammar extends the JavaScript one, so a single
//! rule set covers both; TypeScript-only node kinds never occur in
//! JavaScript trees.

use phf::phf_set;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language as Grammar, Node, Query, QueryCursor};

use super::strip_extension;
use crate::analysis::facts::{
    BaseRelation, Decision, ImportKind, ImportedSymbol, RawBase, RawImport, Receiver,
};
use crate::analysis::traits::{ModuleLookup, ParsedFile};
use crate::analysis::walker::{
    field_text, line_of, named_children, simple_type_name, text, CallArg, CallShape, DefContext,
    Definition, SyntaxRules,
};
use crate::analysis::FileFacts;
use crate::model::EntityKind;

const IMPORT_QUERY: &str = r#"
(import_statement) @import
(export_statement source: (_)) @export
(call_expression
  function: (identifier) @callee
  arguments: (arguments . (string) @source)) @call
"#;

pub(super) static BUILTINS: phf::Set<&'static str> = phf_set! {
    "console", "require", "module", "exports", "process", "window", "document",
    "globalThis", "setTimeout", "setInterval", "clearTimeout", "clearInterval",
    "parseInt", "parseFloat", "isNaN", "JSON", "Math", "Object", "Array",
    "Promise", "String", "Number", "Boolean", "Error", "TypeError", "Symbol",
    "Map", "Set", "WeakMap", "Date", "RegExp", "fetch", "encodeURIComponent",
    "decodeURIComponent", "structuredClone", "queueMicrotask",
};

fn string_value(node: Node, src: &[u8]) -> String {
    text(node, src)
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

pub(super) fn module_name(parsed: &ParsedFile) -> String {
    strip_extension(&parsed.path).to_string()
}

pub(super) fn extract_imports(parsed: &ParsedFile, grammar: &Grammar) -> anyhow::Result<Vec<RawImport>> {
    let query = Query::new(grammar, IMPORT_QUERY)?;
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);
    let src = &parsed.source[..];

    let mut imports = Vec::new();
    while let Some(m) = matches.next() {
        let mut statement = None;
        let mut callee = None;
        let mut source = None;
        let mut call = None;
        for capture in m.captures {
            match query.capture_names()[capture.index as usize] {
                "import" | "export" => statement = Some(capture.node),
                "callee" => callee = Some(capture.node),
                "source" => source = Some(capture.node),
                "call" => call = Some(capture.node),
                _ => {}
            }
        }
        if let Some(node) = statement {
            if let Some(import) = import_statement(node, src) {
                imports.push(import);
            }
        } else if let (Some(callee), Some(source), Some(call)) = (callee, source, call) {
            if text(callee, src) == "require" {
                imports.push(require_call(call, source, src));
            }
        }
    }

    imports.sort_by_key(|i| i.line);
    Ok(imports)
}

fn import_statement(node: Node, src: &[u8]) -> Option<RawImport> {
    let line = line_of(node);
    for child in named_children(node) {
        if child.kind() == "import_require_clause" {
            let source = child.child_by_field_name("source")?;
            let mut import = RawImport::new(string_value(source, src), line);
            import.kind = ImportKind::Require;
            import.alias = named_children(child)
                .into_iter()
                .find(|c| c.kind() == "identifier")
                .map(|c| text(c, src).to_string());
            return Some(import);
        }
    }

    let source = node.child_by_field_name("source")?;
    let mut import = RawImport::new(string_value(source, src), line);
    for child in named_children(node) {
        match child.kind() {
            "import_clause" => {
                for part in named_children(child) {
                    match part.kind() {
                        "identifier" => import.symbols.push(ImportedSymbol {
                            name: "default".to_string(),
                            alias: Some(text(part, src).to_string()),
                            owner: None,
                        }),
                        "namespace_import" => {
                            import.alias = named_children(part)
                                .into_iter()
                                .find(|c| c.kind() == "identifier")
                                .map(|c| text(c, src).to_string());
                        }
                        "named_imports" => specifiers(part, src, &mut import.symbols),
                        _ => {}
                    }
                }
            }
            "export_clause" => specifiers(child, src, &mut import.symbols),
            "namespace_export" => import.wildcard = true,
            _ => {}
        }
    }
    // `export * from './x'`
    if node.kind() == "export_statement" && import.symbols.is_empty() && import.alias.is_none() {
        import.wildcard = true;
    }
    Some(import)
}

fn specifiers(list: Node, src: &[u8], out: &mut Vec<ImportedSymbol>) {
    for spec in named_children(list) {
        if !matches!(spec.kind(), "import_specifier" | "export_specifier") {
            continue;
        }
        if let Some(name) = field_text(spec, "name", src) {
            out.push(ImportedSymbol {
                name: name.trim_matches(|c| c == '"' || c == '\'').to_string(),
                alias: field_text(spec, "alias", src).map(str::to_string),
                owner: None,
            });
        }
    }
}

fn require_call(call: Node, source: Node, src: &[u8]) -> RawImport {
    let mut import = RawImport::new(string_value(source, src), line_of(call));
    import.kind = ImportKind::Require;
    let declarator = call
        .parent()
        .filter(|p| p.kind() == "variable_declarator");
    if let Some(name) = declarator.and_then(|d| d.child_by_field_name("name")) {
        match name.kind() {
            "identifier" => import.alias = Some(text(name, src).to_string()),
            "object_pattern" => {
                for prop in named_children(name) {
                    match prop.kind() {
                        "shorthand_property_identifier_pattern" => {
                            import.symbols.push(ImportedSymbol::named(text(prop, src)))
                        }
                        "pair_pattern" => {
                            let key = field_text(prop, "key", src);
                            let value = prop
                                .child_by_field_name("value")
                                .filter(|v| v.kind() == "identifier")
                                .map(|v| text(v, src).to_string());
                            if let Some(key) = key {
                                import.symbols.push(ImportedSymbol {
                                    name: key.to_string(),
                                    alias: value,
                                    owner: None,
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    import
}

/// Resolve `./x`, `../x` and project-rooted specifiers to module paths.
pub(super) fn resolve_module(
    specifier: &str,
    importer: &FileFacts,
    modules: &dyn ModuleLookup,
) -> Option<String> {
    let relative = specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../");
    let joined = if relative {
        let mut parts: Vec<&str> = importer.path.split('/').collect();
        parts.pop();
        for seg in specifier.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    parts.pop()?;
                }
                other => parts.push(other),
            }
        }
        parts.join("/")
    } else {
        specifier.trim_start_matches('/').to_string()
    };

    let base = strip_extension(&joined);
    [base.to_string(), format!("{}/index", base)]
        .into_iter()
        .find(|candidate| modules.contains(candidate))
}

pub(super) struct EcmaRules;

impl EcmaRules {
    fn dotted(node: Node, src: &[u8]) -> Option<String> {
        match node.kind() {
            "identifier" | "property_identifier" | "type_identifier" => {
                Some(text(node, src).to_string())
            }
            "member_expression" => {
                let object = node.child_by_field_name("object")?;
                let property = node.child_by_field_name("property")?;
                Some(format!("{}.{}", Self::dotted(object, src)?, text(property, src)))
            }
            "nested_identifier" | "nested_type_identifier" => Some(text(node, src).to_string()),
            _ => None,
        }
    }

    fn receiver(object: Node, src: &[u8]) -> Receiver {
        match object.kind() {
            "this" => Receiver::SelfRef,
            "super" => Receiver::Super,
            "new_expression" => object
                .child_by_field_name("constructor")
                .and_then(|c| Self::dotted(c, src))
                .map(Receiver::Construct)
                .unwrap_or(Receiver::Expr),
            "call_expression" => object
                .child_by_field_name("function")
                .and_then(|f| Self::dotted(f, src))
                .map(Receiver::Construct)
                .unwrap_or(Receiver::Expr),
            _ => Self::dotted(object, src)
                .map(Receiver::Path)
                .unwrap_or(Receiver::Expr),
        }
    }

    fn args(node: Node, src: &[u8]) -> Vec<CallArg> {
        let Some(arguments) = node.child_by_field_name("arguments") else {
            return Vec::new();
        };
        named_children(arguments)
            .into_iter()
            .filter_map(|arg| match arg.kind() {
                "identifier" => Some(CallArg {
                    name: text(arg, src).to_string(),
                    receiver: Receiver::None,
                }),
                "member_expression" => {
                    let object = arg.child_by_field_name("object")?;
                    let property = arg.child_by_field_name("property")?;
                    (object.kind() == "this").then(|| CallArg {
                        name: text(property, src).to_string(),
                        receiver: Receiver::SelfRef,
                    })
                }
                _ => None,
            })
            .collect()
    }

    fn annotation_type(annotation: Option<Node>, src: &[u8]) -> Option<String> {
        let annotation = annotation?;
        let ty = if annotation.kind() == "type_annotation" {
            annotation.named_child(0)?
        } else {
            annotation
        };
        simple_type_name(text(ty, src))
    }

    /// Parameter count and typed-parameter bindings of a function-like node.
    fn parameters(function: Node, src: &[u8]) -> (usize, Vec<(String, String)>) {
        if let Some(single) = function.child_by_field_name("parameter") {
            return (usize::from(single.kind() == "identifier"), Vec::new());
        }
        let Some(params) = function.child_by_field_name("parameters") else {
            return (0, Vec::new());
        };
        let mut count = 0;
        let mut bindings = Vec::new();
        for param in named_children(params) {
            match param.kind() {
                "comment" => continue,
                "required_parameter" | "optional_parameter" => {
                    let pattern = param.child_by_field_name("pattern");
                    if pattern.is_some_and(|p| p.kind() == "this") {
                        continue;
                    }
                    if let (Some(pattern), Some(ty)) = (
                        pattern.filter(|p| p.kind() == "identifier"),
                        Self::annotation_type(param.child_by_field_name("type"), src),
                    ) {
                        bindings.push((text(pattern, src).to_string(), ty));
                    }
                }
                _ => {}
            }
            count += 1;
        }
        (count, bindings)
    }

    fn heritage(class: Node, src: &[u8]) -> Vec<RawBase> {
        let mut bases = Vec::new();
        for child in named_children(class) {
            match child.kind() {
                "class_heritage" => {
                    for clause in named_children(child) {
                        match clause.kind() {
                            "extends_clause" => {
                                let mut cursor = clause.walk();
                                for value in clause.children_by_field_name("value", &mut cursor) {
                                    if let Some(name) = Self::dotted(value, src) {
                                        bases.push(RawBase {
                                            name,
                                            relation: BaseRelation::Extends,
                                        });
                                    }
                                }
                            }
                            "implements_clause" => {
                                for ty in named_children(clause) {
                                    if let Some(name) = simple_type_name(text(ty, src)) {
                                        bases.push(RawBase {
                                            name,
                                            relation: BaseRelation::Implements,
                                        });
                                    }
                                }
                            }
                            // JavaScript: `extends <expression>` directly
                            _ => {
                                if let Some(name) = Self::dotted(clause, src) {
                                    bases.push(RawBase {
                                        name,
                                        relation: BaseRelation::Extends,
                                    });
                                }
                            }
                        }
                    }
                }
                "extends_type_clause" => {
                    for ty in named_children(child) {
                        if let Some(name) = simple_type_name(text(ty, src)) {
                            bases.push(RawBase {
                                name,
                                relation: BaseRelation::Extends,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        bases
    }

    fn is_function_value(node: Node) -> bool {
        matches!(
            node.kind(),
            "arrow_function" | "function_expression" | "function" | "generator_function"
        )
    }

    fn function_def<'t>(name: &str, node: Node<'t>, function: Node<'t>, src: &[u8]) -> Definition<'t> {
        let (count, bindings) = Self::parameters(function, src);
        let mut def = Definition::new(EntityKind::Function, name, node);
        def.parameter_count = count;
        def.bindings = bindings;
        def
    }
}

impl SyntaxRules for EcmaRules {
    fn definitions<'t>(&self, node: Node<'t>, src: &[u8], ctx: DefContext) -> Vec<Definition<'t>> {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                match field_text(node, "name", src) {
                    Some(name) => vec![Self::function_def(name, node, node, src)],
                    None => Vec::new(),
                }
            }
            "class_declaration" | "abstract_class_declaration" | "class" => {
                let Some(name) = field_text(node, "name", src) else {
                    return Vec::new();
                };
                let mut def = Definition::new(EntityKind::Class, name, node);
                def.bases = Self::heritage(node, src);
                vec![def]
            }
            "interface_declaration" => {
                let Some(name) = field_text(node, "name", src) else {
                    return Vec::new();
                };
                let mut def = Definition::new(EntityKind::Interface, name, node);
                def.bases = Self::heritage(node, src);
                vec![def]
            }
            "enum_declaration" => match field_text(node, "name", src) {
                Some(name) => vec![Definition::new(EntityKind::Enum, name, node)],
                None => Vec::new(),
            },
            "method_definition" | "method_signature" | "abstract_method_signature"
                if ctx.in_type =>
            {
                match field_text(node, "name", src) {
                    Some(name) => vec![Self::function_def(name, node, node, src)],
                    None => Vec::new(),
                }
            }
            "field_definition" | "public_field_definition" if ctx.in_type => {
                let name = field_text(node, "property", src).or_else(|| field_text(node, "name", src));
                let value = node.child_by_field_name("value").filter(|v| Self::is_function_value(*v));
                match (name, value) {
                    (Some(name), Some(value)) => vec![Self::function_def(name, node, value, src)],
                    _ => Vec::new(),
                }
            }
            "variable_declarator" => {
                let Some(name_node) = node.child_by_field_name("name").filter(|n| n.kind() == "identifier")
                else {
                    return Vec::new();
                };
                let name = text(name_node, src);
                if let Some(value) = node.child_by_field_name("value").filter(|v| Self::is_function_value(*v)) {
                    return vec![Self::function_def(name, node, value, src)];
                }
                if !ctx.at_module {
                    return Vec::new();
                }
                let is_const = node
                    .parent()
                    .and_then(|p| p.child(0))
                    .is_some_and(|kw| text(kw, src) == "const");
                let kind = if is_const {
                    EntityKind::Constant
                } else {
                    EntityKind::Variable
                };
                vec![Definition::new(kind, name, node)]
            }
            _ => Vec::new(),
        }
    }

    fn call(&self, node: Node, src: &[u8]) -> Option<CallShape> {
        match node.kind() {
            "call_expression" => {
                let function = node.child_by_field_name("function")?;
                let (callee, receiver, line) = match function.kind() {
                    "identifier" => (text(function, src).to_string(), Receiver::None, line_of(function)),
                    "member_expression" => {
                        let property = function.child_by_field_name("property")?;
                        let object = function.child_by_field_name("object")?;
                        (
                            text(property, src).to_string(),
                            Self::receiver(object, src),
                            line_of(property),
                        )
                    }
                    _ => return None,
                };
                Some(CallShape {
                    callee,
                    receiver,
                    line,
                    args: Self::args(node, src),
                })
            }
            "new_expression" => {
                let constructor = node.child_by_field_name("constructor")?;
                let path = Self::dotted(constructor, src)?;
                let (receiver, callee) = match path.rsplit_once('.') {
                    Some((prefix, last)) => (Receiver::Path(prefix.to_string()), last.to_string()),
                    None => (Receiver::None, path),
                };
                Some(CallShape {
                    callee,
                    receiver,
                    line: line_of(constructor),
                    args: Self::args(node, src),
                })
            }
            _ => None,
        }
    }

    fn decision(&self, node: Node, src: &[u8]) -> Option<Decision> {
        match node.kind() {
            "if_statement" => Some(Decision::If),
            "for_statement" | "for_in_statement" | "while_statement" | "do_statement" => {
                Some(Decision::Loop)
            }
            "switch_case" => Some(Decision::Case),
            "ternary_expression" => Some(Decision::Ternary),
            "catch_clause" => Some(Decision::Catch),
            "binary_expression" => match field_text(node, "operator", src) {
                Some("&&") => Some(Decision::And),
                Some("||") | Some("??") => Some(Decision::Or),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_comment(&self, node: Node, _src: &[u8]) -> bool {
        node.kind() == "comment"
    }

    fn bindings(&self, node: Node, src: &[u8]) -> Vec<(String, String)> {
        if node.kind() != "variable_declarator" {
            return Vec::new();
        }
        let Some(name) = node.child_by_field_name("name").filter(|n| n.kind() == "identifier") else {
            return Vec::new();
        };
        let ty = Self::annotation_type(node.child_by_field_name("type"), src).or_else(|| {
            node.child_by_field_name("value")
                .filter(|v| v.kind() == "new_expression")
                .and_then(|v| v.child_by_field_name("constructor"))
                .and_then(|c| Self::dotted(c, src))
        });
        match ty {
            Some(ty) => vec![(text(name, src).to_string(), ty)],
            None => Vec::new(),
        }
    }
}
