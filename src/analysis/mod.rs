//! AST-backed fact extraction.
//!
//! This module provides a language-agnostic interface for extracting "facts"
//! from source code using tree-sitter. Facts include:
//! - Entities (modules, types, functions, methods, constants, variables)
//! - Call sites with receiver shapes
//! - Imports/dependencies
//! - Control flow information for complexity calculation
//! - Line statistics
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ Source Files    │────▶│ Analyzers    │────▶│ FileFacts     │
//! └─────────────────┘     │ (registry)   │     │ (file-local)  │
//!                         └──────────────┘     └───────────────┘
//!                                                      │
//!                                                      ▼
//!                                              ┌───────────────┐
//!                                              │ resolve       │
//!                                              │ (global ids)  │
//!                                              └───────────────┘
//! ```
//!
//! # Adding a New Language
//!
//! 1. Create a new module in `src/analysis/languages/`
//! 2. Implement `LanguageAnalyzer`, usually by describing node kinds through
//!    the shared walker's `SyntaxRules`
//! 3. Register the analyzer in `AnalyzerRegistry::with_defaults`

mod facts;
mod languages;
mod registry;
mod traits;
pub(crate) mod walker;

pub use facts::{
    BaseRelation, ControlFlowInfo, Decision, FileFacts, ImportKind, ImportedSymbol, LineStats,
    RawBase, RawCallSite, RawEntity, RawImport, Receiver, Span, TypeRef, TypeRefKind,
};
pub use languages::{
    GoAnalyzer, JavaAnalyzer, JavaScriptAnalyzer, PythonAnalyzer, TypeScriptAnalyzer,
};
pub use registry::AnalyzerRegistry;
pub use traits::{Extraction, LanguageAnalyzer, ModuleLookup, ParsedFile};
