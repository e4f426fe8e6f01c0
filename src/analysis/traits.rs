//! Core traits for language analysis.

use std::collections::BTreeSet;
use std::path::Path;

use super::facts::{FileFacts, LineStats, RawCallSite, RawEntity, RawImport, TypeRef};
use crate::scanner::Language;

/// Holds a parsed tree-sitter tree and associated metadata.
///
/// This is kept separate from FileFacts to allow reusing the tree
/// for multiple extraction passes without re-parsing.
pub struct ParsedFile {
    /// The tree-sitter parse tree.
    pub tree: tree_sitter::Tree,
    /// The original source code (kept for node text extraction).
    pub source: Vec<u8>,
    /// The file path relative to the project root.
    pub path: String,
}

impl ParsedFile {
    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: tree_sitter::Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }

    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Line of the first ERROR or MISSING node.
    pub fn first_error_line(&self) -> Option<usize> {
        let mut node = self.tree.root_node();
        if !node.has_error() {
            return None;
        }
        loop {
            if node.is_error() || node.is_missing() {
                return Some(node.start_position().row + 1);
            }
            let mut cursor = node.walk();
            let next = node.children(&mut cursor).find(|c| c.has_error());
            match next {
                Some(child) => node = child,
                None => return Some(node.start_position().row + 1),
            }
        }
    }
}

/// Output of the single syntax-tree traversal shared by the extractors.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub entities: Vec<RawEntity>,
    pub call_sites: Vec<RawCallSite>,
    pub type_refs: Vec<TypeRef>,
    pub lines: LineStats,
}

/// Read-only view of the modules known to a project.
pub trait ModuleLookup {
    fn contains(&self, module: &str) -> bool;

    /// All module names, in sorted order.
    fn module_names(&self) -> Vec<&str>;
}

impl ModuleLookup for BTreeSet<String> {
    fn contains(&self, module: &str) -> bool {
        BTreeSet::contains(self, module)
    }

    fn module_names(&self) -> Vec<&str> {
        self.iter().map(|s| s.as_str()).collect()
    }
}

/// Language-specific analyzer trait.
///
/// Each supported language implements this trait. Analyzers are stateless
/// apart from their grammar, so one instance serves every worker thread.
///
/// # Thread Safety
///
/// tree_sitter::Parser is not Sync, so implementations create a parser per
/// `parse` call.
pub trait LanguageAnalyzer: Send + Sync {
    fn language(&self) -> Language;

    /// Returns file extensions this analyzer handles (without dot).
    fn file_extensions(&self) -> &'static [&'static str] {
        self.language().extensions()
    }

    /// Parse a source file into a tree-sitter tree.
    ///
    /// Returns an error if parsing fails completely. Partial parse errors are
    /// still returned as a valid tree with ERROR nodes.
    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile>;

    /// Module the parsed file belongs to.
    fn module_name(&self, parsed: &ParsedFile) -> String;

    /// Declared package name, for languages that have one.
    fn package_name(&self, _parsed: &ParsedFile) -> Option<String> {
        None
    }

    /// Walk the tree once, collecting entities, call sites, type references
    /// and line statistics.
    fn extract(&self, parsed: &ParsedFile) -> anyhow::Result<Extraction>;

    fn extract_imports(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<RawImport>>;

    fn extract_entities(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<RawEntity>> {
        Ok(self.extract(parsed)?.entities)
    }

    fn extract_call_sites(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<RawCallSite>> {
        Ok(self.extract(parsed)?.call_sites)
    }

    /// Map an import specifier to a project module, if it names one.
    fn resolve_module(
        &self,
        specifier: &str,
        importer: &FileFacts,
        modules: &dyn ModuleLookup,
    ) -> Option<String>;

    /// Module that `from module import symbol` refers to when `symbol` is a
    /// submodule rather than a member.
    fn submodule_name(&self, _module: &str, _symbol: &str) -> Option<String> {
        None
    }

    /// Whether an unqualified call inside a type body can target a member of
    /// that type (Java).
    fn implicit_member_calls(&self) -> bool {
        false
    }

    /// Whether callables of one name may be overloaded by parameter count
    /// (Java, TypeScript).
    fn supports_overloading(&self) -> bool {
        false
    }

    /// Names a constructor of `type_name` is declared under.
    fn constructor_names(&self, type_name: &str) -> Vec<String>;

    /// Names provided by the language runtime itself.
    fn is_builtin(&self, _name: &str) -> bool {
        false
    }

    /// Extract all facts from a parsed file.
    ///
    /// A tree with syntax errors keeps its module and line statistics but
    /// contributes no entities, calls or imports.
    fn extract_facts(&self, parsed: &ParsedFile) -> anyhow::Result<FileFacts> {
        let extraction = self.extract(parsed)?;
        let mut facts = FileFacts {
            path: parsed.path.clone(),
            language: self.language(),
            module: self.module_name(parsed),
            package: self.package_name(parsed),
            entities: Vec::new(),
            call_sites: Vec::new(),
            imports: Vec::new(),
            type_refs: Vec::new(),
            lines: extraction.lines,
            parse_error: None,
        };
        if let Some(line) = parsed.first_error_line() {
            facts.parse_error = Some(format!(
                "syntax error at line {}; no entities extracted",
                line
            ));
            return Ok(facts);
        }
        facts.imports = self.extract_imports(parsed)?;
        facts.entities = extraction.entities;
        facts.call_sites = extraction.call_sites;
        facts.type_refs = extraction.type_refs;
        Ok(facts)
    }

    /// Check if this analyzer handles the given file extension.
    fn handles_extension(&self, ext: &str) -> bool {
        self.file_extensions().contains(&ext)
    }
}
