//! Codemap - multi-language static analysis engine.
//!
//! Codemap turns a source tree into a structural model: entities (modules,
//! types, functions, methods), a call graph, a module dependency graph and
//! code-quality metrics. Nothing is executed and no source text is kept.
//!
//! # Architecture
//!
//! The pipeline runs strictly downstream:
//!
//! - `scanner`: walks the tree, classifies files, applies limits
//! - `analysis`: tree-sitter analyzers producing file-local facts
//! - `resolve`: global symbol table, call graph and dependency graph
//! - `metrics`: per-file and project metrics
//! - `cache`: per-file facts keyed by fingerprint, reused across runs
//! - `orchestrator`: parallel parse, budgets, progress and artifacts
//! - `artifacts`: versioned JSON output
//!
//! # Example
//!
//! ```no_run
//! use codemap::{AnalysisConfig, Orchestrator};
//!
//! let mut orchestrator = Orchestrator::new(AnalysisConfig::default())?;
//! let outcome = orchestrator.run(std::path::Path::new("."))?;
//! outcome.artifacts.write_to_dir(std::path::Path::new("out"))?;
//! # Ok::<(), codemap::AnalysisError>(())
//! ```

pub mod analysis;
pub mod artifacts;
pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod resolve;
pub mod scanner;

pub use analysis::{AnalyzerRegistry, FileFacts, LanguageAnalyzer};
pub use artifacts::ArtifactSet;
pub use cache::AnalysisCache;
pub use config::AnalysisConfig;
pub use error::{AnalysisError, Diagnostic, DiagnosticKind, Severity};
pub use model::{CallKind, EntityKind, RunStatus};
pub use orchestrator::{AnalysisOutcome, Orchestrator, RunStats};
pub use progress::{BatchUpdate, ProgressMessage};
pub use scanner::{scan, Language};
