//! Project scanning.
//!
//! Walks the project tree in sorted order, classifies files by language and
//! applies the configured limits. The scanner only reads; nothing in the
//! scanned tree is ever modified.

mod fingerprint;
mod language;

pub use fingerprint::{hash_content, Fingerprint};
pub use language::Language;

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{is_excluded, AnalysisConfig, FingerprintMode};
use crate::error::{AnalysisError, Diagnostic, DiagnosticKind};
use crate::model::{FileDescriptor, Project};

/// Result of scanning a project root.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub project: Project,
    pub files: Vec<FileDescriptor>,
    pub diagnostics: Vec<Diagnostic>,
    /// Set when the file-count limit cut the scan short.
    pub truncated: bool,
}

/// Scan `root` according to `config`.
///
/// Fails only when the root itself cannot be read.
pub fn scan(root: &Path, config: &AnalysisConfig) -> Result<ScanOutcome, AnalysisError> {
    let meta = fs::metadata(root).map_err(|source| AnalysisError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(AnalysisError::NotADirectory(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(|source| AnalysisError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let excludes = config.exclusion_set()?;
    let mut files = Vec::new();
    let mut diagnostics = Vec::new();
    let mut truncated = false;

    let walker = WalkDir::new(root)
        .follow_links(config.follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            match e.path().strip_prefix(root) {
                Ok(rel) => !is_excluded(&excludes, rel),
                Err(_) => true,
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(relative_path);
                let mut diag = Diagnostic::warning(
                    DiagnosticKind::FileSkipped,
                    format!("skipped: unreadable entry ({})", e),
                );
                if let Some(path) = path {
                    diag = diag.in_file(path);
                }
                diagnostics.push(diag);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let rel = match path.strip_prefix(root) {
            Ok(rel) => relative_path(rel),
            Err(_) => continue,
        };

        let ext = path.extension().and_then(|e| e.to_str());
        let by_extension = ext.and_then(Language::from_extension);
        match (ext, by_extension) {
            (Some(e), Some(_)) if !config.allows_extension(e) => continue,
            // unknown extension; only extensionless files are sniffed
            (Some(_), None) => continue,
            _ => {}
        }

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                diagnostics.push(
                    Diagnostic::warning(DiagnosticKind::FileSkipped, format!("skipped: {}", e))
                        .in_file(rel),
                );
                continue;
            }
        };

        let language = match by_extension {
            Some(lang) => lang,
            None => {
                match sniff_file(path) {
                    Some(lang) if lang.extensions().iter().any(|e| config.allows_extension(e)) => {
                        lang
                    }
                    _ => continue,
                }
            }
        };

        if meta.len() > config.max_file_size {
            debug!(file = %rel, size = meta.len(), "file exceeds size limit");
            diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::ResourceLimitExceeded,
                    format!(
                        "skipped: too large ({} bytes, limit {})",
                        meta.len(),
                        config.max_file_size
                    ),
                )
                .in_file(rel),
            );
            continue;
        }

        if files.len() >= config.max_files {
            truncated = true;
            diagnostics.push(Diagnostic::warning(
                DiagnosticKind::ResourceLimitExceeded,
                format!(
                    "file count limit of {} reached, remaining files not scanned",
                    config.max_files
                ),
            ));
            break;
        }

        let mut fingerprint = Fingerprint::from_metadata(&meta);
        if config.fingerprint == FingerprintMode::ContentHash {
            match fs::read(path) {
                Ok(content) => fingerprint = fingerprint.with_hash(&content),
                Err(e) => {
                    diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::FileSkipped,
                            format!("skipped: {}", e),
                        )
                        .in_file(rel),
                    );
                    continue;
                }
            }
        }

        files.push(FileDescriptor {
            path: rel,
            abs_path: path.to_path_buf(),
            language,
            size: meta.len(),
            fingerprint,
        });
    }

    let languages: BTreeSet<Language> = files.iter().map(|f| f.language).collect();
    let project = Project {
        name: root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.display().to_string()),
        root: root.to_path_buf(),
        languages,
        file_count: files.len(),
        total_bytes: files.iter().map(|f| f.size).sum(),
    };

    info!(
        root = %root.display(),
        files = files.len(),
        skipped = diagnostics.len(),
        truncated,
        "scan complete"
    );

    Ok(ScanOutcome {
        project,
        files,
        diagnostics,
        truncated,
    })
}

fn sniff_file(path: &Path) -> Option<Language> {
    let mut head = Vec::new();
    fs::File::open(path)
        .ok()?
        .take(language::SNIFF_LIMIT as u64)
        .read_to_end(&mut head)
        .ok()?;
    Language::sniff(&head)
}

/// Relative path with `/` separators.
fn relative_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
