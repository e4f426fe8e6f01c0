//! JavaScript language analyzer using tree-sitter.

use std::path::Path;

use tree_sitter::{Language as Grammar, Parser};

use super::ecmascript::{self, EcmaRules, BUILTINS};
use crate::analysis::facts::RawImport;
use crate::analysis::traits::{Extraction, LanguageAnalyzer, ModuleLookup, ParsedFile};
use crate::analysis::walker;
use crate::analysis::FileFacts;
use crate::scanner::Language;

pub struct JavaScriptAnalyzer {
    grammar: Grammar,
}

impl JavaScriptAnalyzer {
    pub fn new() -> Self {
        Self {
            grammar: tree_sitter_javascript::LANGUAGE.into(),
        }
    }

    fn create_parser(&self) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.grammar)?;
        Ok(parser)
    }
}

impl Default for JavaScriptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for JavaScriptAnalyzer {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser()?;
        let tree = parser.parse(source, None).ok_or_else(|| {
            anyhow::anyhow!("failed to parse JavaScript source: {}", path.display())
        })?;

        Ok(ParsedFile {
            tree,
            source: source.to_vec(),
            path: super::display_path(path),
        })
    }

    fn module_name(&self, parsed: &ParsedFile) -> String {
        ecmascript::module_name(parsed)
    }

    fn extract(&self, parsed: &ParsedFile) -> anyhow::Result<Extraction> {
        let module = self.module_name(parsed);
        Ok(walker::walk(parsed, &EcmaRules, &module))
    }

    fn extract_imports(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<RawImport>> {
        ecmascript::extract_imports(parsed, &self.grammar)
    }

    fn resolve_module(
        &self,
        specifier: &str,
        importer: &FileFacts,
        modules: &dyn ModuleLookup,
    ) -> Option<String> {
        ecmascript::resolve_module(specifier, importer, modules)
    }

    fn constructor_names(&self, _type_name: &str) -> Vec<String> {
        vec!["constructor".to_string()]
    }

    fn is_builtin(&self, name: &str) -> bool {
        BUILTINS.contains(name)
    }
}
