//! Cross-file resolution over the complete set of file facts.
//!
//! Resolution is a single pass that needs the global view: the symbol table
//! is built first, then the call graph and the dependency graph are derived
//! from it. Both builders only read the table.

mod calls;
mod deps;
mod entities;

pub use calls::{build_call_graph, CallGraph};
pub use deps::{build_dependency_graph, find_cycles, DependencyGraph};
pub use entities::{Binding, FileScope, InheritanceLink, Lookup, SymbolTable};

use tracing::info;

use crate::analysis::{AnalyzerRegistry, FileFacts};
use crate::error::Diagnostic;

/// Output of one resolution pass.
pub struct Resolution {
    pub symbols: SymbolTable,
    pub calls: CallGraph,
    pub deps: DependencyGraph,
    /// Symbol table, call and dependency diagnostics, in that order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolve `facts` into entities and graphs.
pub fn resolve(facts: &[FileFacts], registry: &AnalyzerRegistry) -> Resolution {
    let symbols = SymbolTable::build(facts, registry);
    let (calls, call_diagnostics) = build_call_graph(facts, &symbols, registry);
    let (deps, dep_diagnostics) = build_dependency_graph(facts, &symbols, registry);

    let mut diagnostics = symbols.diagnostics().to_vec();
    diagnostics.extend(call_diagnostics);
    diagnostics.extend(dep_diagnostics);

    info!(
        "resolved {} files: {} entities, {} call edges, {} dependency edges, {} cycles",
        symbols.files().len(),
        symbols.entities().len(),
        calls.len(),
        deps.edges().len(),
        deps.cycles().len()
    );

    Resolution {
        symbols,
        calls,
        deps,
        diagnostics,
    }
}
