//! Analysis configuration.
//!
//! Configuration is a plain serde structure. Every field has a default, so an
//! empty YAML document (or `AnalysisConfig::default()`) is a valid
//! configuration. Loading the document from disk is left to the caller.

use std::path::Path;
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::scanner::Language;

/// How file fingerprints are computed for cache invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// Size plus an xxh3 hash of the content.
    #[default]
    ContentHash,
    /// Size plus modification time only.
    Metadata,
}

/// Top-level analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Maximum number of files scanned before truncating (default: 1000)
    pub max_files: usize,
    /// Maximum size in bytes of a single file (default: 10 MiB)
    pub max_file_size: u64,
    /// Extensions (without dot) eligible for analysis
    pub extensions: Vec<String>,
    /// Glob patterns matched against each path component and the relative path
    pub excluded_patterns: Vec<String>,
    pub follow_links: bool,
    pub fingerprint: FingerprintMode,
    /// Parse workers; 0 lets rayon pick
    pub workers: usize,
    /// Files per progress batch and per budget check (default: 20)
    pub batch_size: usize,
    /// Wall-clock budget for a run (default: 300)
    pub timeout_secs: u64,
    /// Ceiling on the estimated size of collected facts (default: 512)
    pub memory_limit_mb: u64,
    /// Number of ranked complexity hotspots (default: 10)
    pub hotspot_count: usize,
    /// Capacity of the progress channel (default: 64)
    pub progress_buffer: usize,
}

pub const DEFAULT_MAX_FILES: usize = 1000;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 512;

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            extensions: Language::all()
                .iter()
                .flat_map(|l| l.extensions().iter().map(|e| e.to_string()))
                .collect(),
            excluded_patterns: [
                "node_modules",
                ".git",
                "__pycache__",
                "venv",
                ".env",
                "*.min.js",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            follow_links: false,
            fingerprint: FingerprintMode::default(),
            workers: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            hotspot_count: 10,
            progress_buffer: 64,
        }
    }
}

impl AnalysisConfig {
    /// Parse a configuration from a YAML document and validate it.
    pub fn from_yaml(content: &str) -> Result<Self, AnalysisError> {
        let config: AnalysisConfig = serde_yaml::from_str(content)
            .map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.batch_size == 0 {
            return Err(AnalysisError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.progress_buffer == 0 {
            return Err(AnalysisError::InvalidConfig(
                "progress_buffer must be at least 1".to_string(),
            ));
        }
        for ext in &self.extensions {
            if ext.starts_with('.') {
                return Err(AnalysisError::InvalidConfig(format!(
                    "extension {:?} must be given without a leading dot",
                    ext
                )));
            }
        }
        self.exclusion_set()?;
        Ok(())
    }

    /// Compile `excluded_patterns` into a single matcher.
    pub fn exclusion_set(&self) -> Result<GlobSet, AnalysisError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.excluded_patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                AnalysisError::InvalidConfig(format!("invalid exclude pattern {:?}: {}", pattern, e))
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| AnalysisError::InvalidConfig(e.to_string()))
    }

    pub fn allows_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb.saturating_mul(1024 * 1024)
    }
}

/// Whether `rel_path` (relative, `/`-separated) is excluded by `set`.
///
/// A path is excluded when the whole path or any single component matches.
pub fn is_excluded(set: &GlobSet, rel_path: &Path) -> bool {
    if set.is_empty() {
        return false;
    }
    if set.is_match(rel_path) {
        return true;
    }
    rel_path
        .components()
        .any(|c| set.is_match(c.as_os_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = AnalysisConfig::from_yaml("{}").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.max_files, 1000);
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.fingerprint, FingerprintMode::ContentHash);
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = r#"
max_files: 5
fingerprint: metadata
extensions: [py]
"#;
        let config = AnalysisConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.max_files, 5);
        assert_eq!(config.fingerprint, FingerprintMode::Metadata);
        assert!(config.allows_extension("py"));
        assert!(!config.allows_extension("go"));
        assert_eq!(config.timeout_secs, 300);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AnalysisConfig::from_yaml("batch_size: 0").is_err());
        assert!(AnalysisConfig::from_yaml("extensions: ['.py']").is_err());
        assert!(AnalysisConfig::from_yaml("excluded_patterns: ['a[']").is_err());
        assert!(AnalysisConfig::from_yaml("max_files: [1]").is_err());
    }

    #[test]
    fn test_default_exclusions() {
        let set = AnalysisConfig::default().exclusion_set().unwrap();
        assert!(is_excluded(&set, Path::new("web/node_modules/x/index.js")));
        assert!(is_excluded(&set, Path::new("pkg/__pycache__/a.py")));
        assert!(is_excluded(&set, Path::new("static/app.min.js")));
        assert!(!is_excluded(&set, Path::new("src/app.js")));
        assert!(!is_excluded(&set, Path::new("src/environment.py")));
    }
}
