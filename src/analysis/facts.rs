//! Fact structures extracted from a single file's syntax tree.
//!
//! Everything here is file-local: entities refer to each other by their index
//! in [`FileFacts::entities`], and call sites and imports carry names exactly
//! as written. Cross-file binding happens later in `resolve`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::EntityKind;
use crate::scanner::Language;

/// Source location span with byte offsets and line/column positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed).
    pub start_col: usize,
    /// End line (1-indexed).
    pub end_line: usize,
    /// End column (1-indexed).
    pub end_col: usize,
}

impl Span {
    /// Create a span from a tree-sitter node.
    pub fn from_node(node: tree_sitter::Node) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: start.row + 1, // tree-sitter is 0-indexed
            start_col: start.column + 1,
            end_line: end.row + 1,
            end_col: end.column + 1,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// Control flow information for cyclomatic complexity calculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlowInfo {
    /// Number of if/elif statements.
    pub if_count: usize,
    /// Number of for/while/do loops.
    pub loop_count: usize,
    /// Number of case arms (switch, match, Go select/type switch).
    pub case_count: usize,
    /// Number of && / and operators.
    pub and_count: usize,
    /// Number of || / or / ?? operators.
    pub or_count: usize,
    /// Number of ternary operators.
    pub ternary_count: usize,
    /// Number of catch/except clauses.
    pub catch_count: usize,
}

/// A single decision point found in a callable body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    If,
    Loop,
    Case,
    And,
    Or,
    Ternary,
    Catch,
}

impl ControlFlowInfo {
    pub fn record(&mut self, decision: Decision) {
        match decision {
            Decision::If => self.if_count += 1,
            Decision::Loop => self.loop_count += 1,
            Decision::Case => self.case_count += 1,
            Decision::And => self.and_count += 1,
            Decision::Or => self.or_count += 1,
            Decision::Ternary => self.ternary_count += 1,
            Decision::Catch => self.catch_count += 1,
        }
    }

    /// Calculate cyclomatic complexity.
    ///
    /// CC = 1 + decision_points
    pub fn cyclomatic_complexity(&self) -> u32 {
        let decision_points = self.if_count
            + self.loop_count
            + self.case_count
            + self.and_count
            + self.or_count
            + self.ternary_count
            + self.catch_count;

        1 + decision_points as u32
    }
}

/// How a type declaration refers to one of its base types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseRelation {
    Extends,
    Implements,
}

/// A base type as written in the declaration (possibly dotted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBase {
    pub name: String,
    pub relation: BaseRelation,
}

/// An entity with file-local identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntity {
    pub kind: EntityKind,
    pub name: String,
    /// Name within the module, e.g. `X.m`. The module entity carries the
    /// module name.
    pub qualified_name: String,
    /// Local index of the containing entity. `None` only for the module entity.
    pub parent: Option<usize>,
    /// Type the entity belongs to when it is declared outside that type's
    /// body (Go receiver methods).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<RawBase>,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_flow: Option<ControlFlowInfo>,
    #[serde(default)]
    pub parameter_count: usize,
}

/// Shape of the expression a call is made through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Receiver {
    /// Plain `f()`.
    None,
    /// `self.f()` / `this.f()`.
    SelfRef,
    /// `super().f()` / `super.f()`.
    Super,
    /// Dotted identifier path, e.g. `a.b.f()` has path `a.b`.
    Path(String),
    /// Result of calling or constructing a named thing, e.g. `X().f()`.
    Construct(String),
    /// Any other expression.
    Expr,
}

/// A call as it appears in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCallSite {
    /// Local index of the innermost enclosing entity.
    pub caller: usize,
    pub callee: String,
    pub receiver: Receiver,
    /// Type of a single-identifier receiver inferred from a local binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_type: Option<String>,
    pub line: usize,
    /// Identifier passed as an argument rather than called directly.
    #[serde(default)]
    pub callback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    Import,
    Require,
}

/// A name brought into scope by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedSymbol {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Containing type for member imports (Java `import static a.B.m`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl ImportedSymbol {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            owner: None,
        }
    }

    /// Name the symbol is visible under in the importing file.
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// An import or require statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImport {
    /// Module specifier as written (Java and Go already normalised to the
    /// package part).
    pub module: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<ImportedSymbol>,
    /// Local name bound to the whole module, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub kind: ImportKind,
    #[serde(default)]
    pub wildcard: bool,
    pub line: usize,
}

impl RawImport {
    pub fn new(module: impl Into<String>, line: usize) -> Self {
        Self {
            module: module.into(),
            symbols: Vec::new(),
            alias: None,
            kind: ImportKind::Import,
            wildcard: false,
            line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeRefKind {
    /// Declared type of a field.
    Field,
    /// Declared type of a method or constructor parameter.
    Parameter,
}

/// A type name used in a declaration (Java fields and parameters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    pub type_name: String,
    pub kind: TypeRefKind,
    pub line: usize,
}

/// Physical line counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStats {
    pub total: usize,
    pub code: usize,
    pub comment: usize,
    pub blank: usize,
}

/// All facts extracted from a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFacts {
    /// File path (relative to the project root).
    pub path: String,
    pub language: Language,
    /// Module the file belongs to.
    pub module: String,
    /// Declared package name (Go, Java).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Entities; index 0 is the module entity.
    pub entities: Vec<RawEntity>,
    pub call_sites: Vec<RawCallSite>,
    pub imports: Vec<RawImport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_refs: Vec<TypeRef>,
    pub lines: LineStats,
    /// Set when the tree contained syntax errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl FileFacts {
    /// Create empty facts for a file.
    pub fn empty(path: &str, language: Language, module: &str) -> Self {
        Self {
            path: path.to_string(),
            language,
            module: module.to_string(),
            package: None,
            entities: Vec::new(),
            call_sites: Vec::new(),
            imports: Vec::new(),
            type_refs: Vec::new(),
            lines: LineStats::default(),
            parse_error: None,
        }
    }

    /// Rough heap footprint, used for the memory budget.
    pub fn estimated_bytes(&self) -> u64 {
        let entities: usize = self
            .entities
            .iter()
            .map(|e| {
                std::mem::size_of::<RawEntity>()
                    + e.name.len()
                    + e.qualified_name.len()
                    + e.bases.iter().map(|b| b.name.len() + 16).sum::<usize>()
            })
            .sum();
        let calls: usize = self
            .call_sites
            .iter()
            .map(|c| {
                std::mem::size_of::<RawCallSite>()
                    + c.callee.len()
                    + c.receiver_type.as_ref().map_or(0, |t| t.len())
            })
            .sum();
        let imports: usize = self
            .imports
            .iter()
            .map(|i| {
                std::mem::size_of::<RawImport>()
                    + i.module.len()
                    + i.symbols.iter().map(|s| s.name.len() + 32).sum::<usize>()
            })
            .sum();
        (std::mem::size_of::<FileFacts>()
            + self.path.len()
            + self.module.len()
            + entities
            + calls
            + imports
            + self.type_refs.len() * std::mem::size_of::<TypeRef>()) as u64
    }

    /// Callable entities with their local indices.
    pub fn callables(&self) -> impl Iterator<Item = (usize, &RawEntity)> {
        self.entities
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind.is_callable())
    }
}
