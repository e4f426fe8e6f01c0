//! Core data model shared by the resolver, graph builders and artifacts.
//!
//! Entities live in a single arena (`Vec<Entity>`) and refer to each other by
//! [`EntityIdx`]. Edges are index pairs into that arena, so graphs with cycles
//! need no shared ownership.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::scanner::{Fingerprint, Language};

/// Project-level summary, fixed once the scan completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
    pub languages: BTreeSet<Language>,
    pub file_count: usize,
    pub total_bytes: u64,
}

/// A file selected for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Path relative to the project root, `/`-separated.
    pub path: String,
    pub abs_path: PathBuf,
    pub language: Language,
    pub size: u64,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Module,
    Class,
    Interface,
    Struct,
    Enum,
    Function,
    Method,
    Constant,
    Variable,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Module => "module",
            EntityKind::Class => "class",
            EntityKind::Interface => "interface",
            EntityKind::Struct => "struct",
            EntityKind::Enum => "enum",
            EntityKind::Function => "function",
            EntityKind::Method => "method",
            EntityKind::Constant => "constant",
            EntityKind::Variable => "variable",
        }
    }

    /// Prefix of the entity identity (`{prefix}:{qualified_name}`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityKind::Module => "module",
            EntityKind::Class => "class",
            EntityKind::Interface => "interface",
            EntityKind::Struct => "struct",
            EntityKind::Enum => "enum",
            EntityKind::Function | EntityKind::Method => "func",
            EntityKind::Constant => "const",
            EntityKind::Variable => "var",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "module" => Some(EntityKind::Module),
            "class" => Some(EntityKind::Class),
            "interface" => Some(EntityKind::Interface),
            "struct" => Some(EntityKind::Struct),
            "enum" => Some(EntityKind::Enum),
            "function" => Some(EntityKind::Function),
            "method" => Some(EntityKind::Method),
            "constant" => Some(EntityKind::Constant),
            "variable" => Some(EntityKind::Variable),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, EntityKind::Function | EntityKind::Method)
    }

    /// Kinds that own a method table and can take part in inheritance.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            EntityKind::Class | EntityKind::Interface | EntityKind::Struct | EntityKind::Enum
        )
    }

    /// Kinds that open a named scope for nested definitions.
    pub fn is_scope(&self) -> bool {
        self.is_type() || self.is_callable() || *self == EntityKind::Module
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Index of an entity in the project arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityIdx(pub usize);

/// A resolved code entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Stable identity, unique within the project.
    pub id: String,
    pub kind: EntityKind,
    pub name: String,
    /// Name within its module, e.g. `X.m`.
    pub qualified_name: String,
    pub module: String,
    /// Owning file (relative path of a scanned file).
    pub file: String,
    pub line: usize,
    pub end_line: usize,
    /// Containing entity; the module entity for top-level items.
    pub parent: Option<EntityIdx>,
    pub children: Vec<EntityIdx>,
    /// Resolved base types, in declaration order.
    pub bases: Vec<EntityIdx>,
    /// Cyclomatic complexity, callables only.
    pub complexity: Option<u32>,
    pub parameter_count: usize,
}

/// Kinds of call edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    DirectCall,
    Callback,
    Inheritance,
    Override,
    Dynamic,
    External,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::DirectCall => "direct_call",
            CallKind::Callback => "callback",
            CallKind::Inheritance => "inheritance",
            CallKind::Override => "override",
            CallKind::Dynamic => "dynamic",
            CallKind::External => "external",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a call site could not be bound to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// No symbol with that name is visible from the call site.
    NoCandidate,
    /// The receiver's type is known but has no such member.
    UnknownMember,
    /// The receiver's type could not be inferred and no class defines the name.
    UnknownReceiver,
    /// The name or receiver is bound to a module outside the project.
    ExternalImport,
    /// The member would come from a base type outside the project.
    ExternalBase,
}

impl UnresolvedReason {
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            UnresolvedReason::ExternalImport | UnresolvedReason::ExternalBase
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnresolvedReason::NoCandidate => "no_candidate",
            UnresolvedReason::UnknownMember => "unknown_member",
            UnresolvedReason::UnknownReceiver => "unknown_receiver",
            UnresolvedReason::ExternalImport => "external_import",
            UnresolvedReason::ExternalBase => "external_base",
        }
    }
}

/// Target of a call edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Callee {
    Entity(EntityIdx),
    Unresolved {
        name: String,
        reason: UnresolvedReason,
    },
}

impl Callee {
    /// Placeholder identity for unresolved callees.
    pub fn placeholder(name: &str, reason: UnresolvedReason) -> String {
        if reason.is_external() {
            format!("external:{}", name)
        } else {
            format!("unresolved:{}", name)
        }
    }

    pub fn entity(&self) -> Option<EntityIdx> {
        match self {
            Callee::Entity(idx) => Some(*idx),
            Callee::Unresolved { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallEdge {
    pub caller: EntityIdx,
    pub callee: Callee,
    pub kind: CallKind,
    pub line: usize,
    /// File containing the call site.
    pub file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Import,
    Require,
    Inheritance,
    Implementation,
    Composition,
    Association,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Import => "import",
            DependencyKind::Require => "require",
            DependencyKind::Inheritance => "inheritance",
            DependencyKind::Implementation => "implementation",
            DependencyKind::Composition => "composition",
            DependencyKind::Association => "association",
        }
    }

    /// Edges created by an import or require statement.
    pub fn is_import(&self) -> bool {
        matches!(self, DependencyKind::Import | DependencyKind::Require)
    }
}

/// Module-level dependency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyEdge {
    pub source: String,
    /// Internal module name, or the raw specifier for external targets.
    pub target: String,
    pub kind: DependencyKind,
    pub symbols: Vec<String>,
    pub file: String,
    pub line: usize,
    pub external: bool,
}

/// Completion status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Complete,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Complete => "complete",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
