//! TypeScript language analyzer using tree-sitter.
//!
//! `.tsx` files use the TSX grammar; everything else uses the plain
//! TypeScript grammar. Extraction rules are shared with JavaScript.

use std::path::Path;

use tree_sitter::{Language as Grammar, Parser};

use super::ecmascript::{self, EcmaRules, BUILTINS};
use crate::analysis::facts::RawImport;
use crate::analysis::traits::{Extraction, LanguageAnalyzer, ModuleLookup, ParsedFile};
use crate::analysis::walker;
use crate::analysis::FileFacts;
use crate::scanner::Language;

pub struct TypeScriptAnalyzer {
    typescript: Grammar,
    tsx: Grammar,
}

impl TypeScriptAnalyzer {
    pub fn new() -> Self {
        Self {
            typescript: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            tsx: tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    fn grammar_for(&self, path: &str) -> &Grammar {
        if path.ends_with(".tsx") {
            &self.tsx
        } else {
            &self.typescript
        }
    }

    fn create_parser(&self, path: &str) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(self.grammar_for(path))?;
        Ok(parser)
    }
}

impl Default for TypeScriptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for TypeScriptAnalyzer {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile> {
        let display = super::display_path(path);
        let mut parser = self.create_parser(&display)?;
        let tree = parser.parse(source, None).ok_or_else(|| {
            anyhow::anyhow!("failed to parse TypeScript source: {}", path.display())
        })?;

        Ok(ParsedFile {
            tree,
            source: source.to_vec(),
            path: display,
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
        ecmascript::extract_imports(parsed, self.grammar_for(&parsed.path))
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

    fn supports_overloading(&self) -> bool {
        true
    }

    fn is_builtin(&self, name: &str) -> bool {
        BUILTINS.contains(name)
    }
}
