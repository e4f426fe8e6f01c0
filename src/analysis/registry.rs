//! Explicit set of language analyzers, built once per orchestrator.

use super::languages::{
    GoAnalyzer, JavaAnalyzer, JavaScriptAnalyzer, PythonAnalyzer, TypeScriptAnalyzer,
};
use super::traits::LanguageAnalyzer;
use crate::scanner::Language;

pub struct AnalyzerRegistry {
    analyzers: Vec<Box<dyn LanguageAnalyzer>>,
}

impl AnalyzerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            analyzers: Vec::new(),
        }
    }

    /// A registry with every built-in analyzer.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GoAnalyzer::new()));
        registry.register(Box::new(JavaAnalyzer::new()));
        registry.register(Box::new(JavaScriptAnalyzer::new()));
        registry.register(Box::new(PythonAnalyzer::new()));
        registry.register(Box::new(TypeScriptAnalyzer::new()));
        registry
    }

    /// Add an analyzer, replacing any existing one for the same language.
    pub fn register(&mut self, analyzer: Box<dyn LanguageAnalyzer>) {
        let language = analyzer.language();
        self.analyzers.retain(|a| a.language() != language);
        self.analyzers.push(analyzer);
        self.analyzers.sort_by_key(|a| a.language());
    }

    pub fn for_language(&self, language: Language) -> Option<&dyn LanguageAnalyzer> {
        self.analyzers
            .iter()
            .find(|a| a.language() == language)
            .map(|a| a.as_ref())
    }

    /// Get an analyzer for the given file extension.
    pub fn for_extension(&self, ext: &str) -> Option<&dyn LanguageAnalyzer> {
        self.analyzers
            .iter()
            .find(|a| a.handles_extension(ext))
            .map(|a| a.as_ref())
    }

    /// Registered languages in sorted order.
    pub fn languages(&self) -> Vec<Language> {
        self.analyzers.iter().map(|a| a.language()).collect()
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
