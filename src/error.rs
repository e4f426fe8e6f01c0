//! Error and diagnostic types.
//!
//! Only a handful of conditions abort a run; they are modelled by
//! [`AnalysisError`]. Everything that goes wrong for a single file, call site
//! or cache entry is recovered where it happens and recorded as a
//! [`Diagnostic`] attached to the run's output.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that stop an analysis run or an artifact operation.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("cannot read project root {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("project root {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("artifact I/O failed for {path}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache I/O failed for {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Severity levels for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Recoverable conditions recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ParseError,
    ResolutionAmbiguity,
    UnresolvedSymbol,
    ResourceLimitExceeded,
    TimeoutExceeded,
    CacheCorruption,
    DuplicateDeclaration,
    InheritanceCycle,
    CircularDependency,
    FileSkipped,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::ParseError => "parse_error",
            DiagnosticKind::ResolutionAmbiguity => "resolution_ambiguity",
            DiagnosticKind::UnresolvedSymbol => "unresolved_symbol",
            DiagnosticKind::ResourceLimitExceeded => "resource_limit_exceeded",
            DiagnosticKind::TimeoutExceeded => "timeout_exceeded",
            DiagnosticKind::CacheCorruption => "cache_corruption",
            DiagnosticKind::DuplicateDeclaration => "duplicate_declaration",
            DiagnosticKind::InheritanceCycle => "inheritance_cycle",
            DiagnosticKind::CircularDependency => "circular_dependency",
            DiagnosticKind::FileSkipped => "file_skipped",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single recorded issue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            file: None,
            line: None,
            message: message.into(),
        }
    }

    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, message)
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, message)
    }

    pub fn info(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Info, message)
    }

    /// Attach the file the diagnostic refers to.
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Attach a 1-indexed source line.
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(
                f,
                "{} [{}] {}:{}: {}",
                self.severity, self.kind, file, line, self.message
            ),
            (Some(file), None) => {
                write!(f, "{} [{}] {}: {}", self.severity, self.kind, file, self.message)
            }
            _ => write!(f, "{} [{}] {}", self.severity, self.kind, self.message),
        }
    }
}
