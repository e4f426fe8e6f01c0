//! Per-file fact cache keyed by path and fingerprint.
//!
//! Entries live in memory and, when a directory is configured, in one JSON
//! file per source file under that directory. Entries are loaded when the
//! cache is opened; a corrupt file is deleted on its own and reported as a
//! `cache_corruption` diagnostic.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::analysis::FileFacts;
use crate::error::{AnalysisError, Diagnostic, DiagnosticKind};
use crate::scanner::Fingerprint;

/// Bumped whenever the layout of cached facts changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    version: u32,
    path: String,
    fingerprint: Fingerprint,
    facts: FileFacts,
}

pub struct AnalysisCache {
    memory: RwLock<HashMap<String, CacheEntry>>,
    cache_dir: Option<PathBuf>,
    /// Paths inserted since the last persist.
    dirty: Mutex<HashSet<String>>,
    /// Paths pruned since the last persist.
    removed: Mutex<HashSet<String>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl AnalysisCache {
    /// A cache that lives only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            cache_dir: None,
            dirty: Mutex::new(HashSet::new()),
            removed: Mutex::new(HashSet::new()),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    /// Open (creating if needed) a cache directory and load its entries.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AnalysisError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| AnalysisError::CacheIo {
            path: dir.clone(),
            source,
        })?;

        let mut entries = HashMap::new();
        let mut diagnostics = Vec::new();
        let listing = fs::read_dir(&dir).map_err(|source| AnalysisError::CacheIo {
            path: dir.clone(),
            source,
        })?;
        for item in listing.flatten() {
            let file = item.path();
            if file.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_entry(&file) {
                Ok(entry) => {
                    entries.insert(entry.path.clone(), entry);
                }
                Err(reason) => {
                    warn!("discarding cache entry {}: {}", file.display(), reason);
                    if let Err(e) = fs::remove_file(&file) {
                        warn!("failed to delete cache entry {}: {}", file.display(), e);
                    }
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::CacheCorruption,
                        format!("discarded cache entry {}: {}", file.display(), reason),
                    ));
                }
            }
        }
        debug!("loaded {} cache entries from {}", entries.len(), dir.display());

        Ok(Self {
            memory: RwLock::new(entries),
            cache_dir: Some(dir),
            dirty: Mutex::new(HashSet::new()),
            removed: Mutex::new(HashSet::new()),
            diagnostics: Mutex::new(diagnostics),
        })
    }

    /// Per-project cache directory under the user cache dir.
    pub fn default_location(root: &Path) -> Option<PathBuf> {
        let key = format!("{:016x}", xxh3_64(root.to_string_lossy().as_bytes()));
        ProjectDirs::from("", "", "codemap").map(|dirs| dirs.cache_dir().join("analysis").join(key))
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Cached facts for `path`, if its fingerprint still matches.
    pub fn lookup(&self, path: &str, fingerprint: &Fingerprint) -> Option<FileFacts> {
        let memory = self.memory.read().ok()?;
        let entry = memory.get(path)?;
        if entry.fingerprint.matches(fingerprint) {
            Some(entry.facts.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, path: &str, fingerprint: Fingerprint, facts: FileFacts) {
        let entry = CacheEntry {
            version: CACHE_FORMAT_VERSION,
            path: path.to_string(),
            fingerprint,
            facts,
        };
        if let Ok(mut memory) = self.memory.write() {
            memory.insert(path.to_string(), entry);
        }
        if let Ok(mut dirty) = self.dirty.lock() {
            dirty.insert(path.to_string());
        }
        if let Ok(mut removed) = self.removed.lock() {
            removed.remove(path);
        }
    }

    /// Drop entries for files not in `present`. Returns how many were dropped.
    pub fn retain_paths(&self, present: &BTreeSet<String>) -> usize {
        let Ok(mut memory) = self.memory.write() else {
            return 0;
        };
        let stale: Vec<String> = memory
            .keys()
            .filter(|p| !present.contains(*p))
            .cloned()
            .collect();
        for path in &stale {
            memory.remove(path);
        }
        if let Ok(mut removed) = self.removed.lock() {
            removed.extend(stale.iter().cloned());
        }
        if let Ok(mut dirty) = self.dirty.lock() {
            for path in &stale {
                dirty.remove(path);
            }
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.memory.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write changed entries and delete pruned ones. Returns the number of
    /// entries written. A no-op for in-memory caches.
    pub fn persist(&self) -> Result<usize, AnalysisError> {
        let Some(dir) = &self.cache_dir else {
            return Ok(0);
        };
        let dirty: Vec<String> = match self.dirty.lock() {
            Ok(mut dirty) => dirty.drain().collect(),
            Err(_) => Vec::new(),
        };
        let removed: Vec<String> = match self.removed.lock() {
            Ok(mut removed) => removed.drain().collect(),
            Err(_) => Vec::new(),
        };

        for path in &removed {
            let file = entry_file(dir, path);
            if file.exists() {
                fs::remove_file(&file).map_err(|source| AnalysisError::CacheIo { path: file, source })?;
            }
        }

        let memory = match self.memory.read() {
            Ok(memory) => memory,
            Err(_) => return Ok(0),
        };
        let mut written = 0;
        for path in &dirty {
            let Some(entry) = memory.get(path) else {
                continue;
            };
            let file = entry_file(dir, path);
            let content = serde_json::to_vec(entry)?;
            fs::write(&file, content).map_err(|source| AnalysisError::CacheIo { path: file, source })?;
            written += 1;
        }
        debug!(
            "persisted {} cache entries, removed {}",
            written,
            removed.len()
        );
        Ok(written)
    }

    /// Diagnostics recorded while loading, drained.
    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        match self.diagnostics.lock() {
            Ok(mut diagnostics) => std::mem::take(&mut *diagnostics),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn entry_file(dir: &Path, path: &str) -> PathBuf {
    dir.join(format!("{:016x}.json", xxh3_64(path.as_bytes())))
}

fn load_entry(file: &Path) -> Result<CacheEntry, String> {
    let content = fs::read(file).map_err(|e| e.to_string())?;
    let entry: CacheEntry = serde_json::from_slice(&content).map_err(|e| e.to_string())?;
    if entry.version != CACHE_FORMAT_VERSION {
        return Err(format!(
            "format version {} (expected {})",
            entry.version, CACHE_FORMAT_VERSION
        ));
    }
    let dir = file.parent().unwrap_or(Path::new("."));
    if entry_file(dir, &entry.path) != file {
        return Err(format!("entry for {} stored under the wrong key", entry.path));
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Language;

    fn fp(size: u64, hash: u64) -> Fingerprint {
        Fingerprint {
            size,
            mtime_ns: 1,
            hash: Some(hash),
        }
    }

    fn facts(path: &str) -> FileFacts {
        FileFacts::empty(path, Language::Python, path.trim_end_matches(".py"))
    }

    #[test]
    fn test_lookup_requires_matching_fingerprint() {
        let cache = AnalysisCache::in_memory();
        cache.insert("a.py", fp(10, 1), facts("a.py"));
        assert_eq!(cache.lookup("a.py", &fp(10, 1)).unwrap().path, "a.py");
        assert!(cache.lookup("a.py", &fp(10, 2)).is_none());
        assert!(cache.lookup("b.py", &fp(10, 1)).is_none());
    }

    #[test]
    fn test_persist_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::open(dir.path()).unwrap();
        cache.insert("a.py", fp(10, 1), facts("a.py"));
        cache.insert("b.py", fp(20, 2), facts("b.py"));
        assert_eq!(cache.persist().unwrap(), 2);

        let reopened = AnalysisCache::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.lookup("b.py", &fp(20, 2)).is_some());
        assert!(reopened.take_diagnostics().is_empty());
    }

    #[test]
    fn test_pruned_entries_are_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::open(dir.path()).unwrap();
        cache.insert("a.py", fp(10, 1), facts("a.py"));
        cache.insert("b.py", fp(20, 2), facts("b.py"));
        cache.persist().unwrap();

        let present: BTreeSet<String> = ["a.py".to_string()].into_iter().collect();
        assert_eq!(cache.retain_paths(&present), 1);
        cache.persist().unwrap();

        let reopened = AnalysisCache::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.lookup("b.py", &fp(20, 2)).is_none());
    }

    #[test]
    fn test_corrupt_entry_discarded_individually() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::open(dir.path()).unwrap();
        cache.insert("a.py", fp(10, 1), facts("a.py"));
        cache.insert("b.py", fp(20, 2), facts("b.py"));
        cache.persist().unwrap();

        let broken = entry_file(dir.path(), "b.py");
        fs::write(&broken, b"{ not json").unwrap();

        let reopened = AnalysisCache::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.lookup("a.py", &fp(10, 1)).is_some());
        assert!(!broken.exists());
        let diagnostics = reopened.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::CacheCorruption);
        assert!(diagnostics[0].file.is_none());
        assert!(diagnostics[0]
            .message
            .contains(&broken.display().to_string()));
    }

    #[test]
    fn test_version_mismatch_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let entry = CacheEntry {
            version: CACHE_FORMAT_VERSION + 1,
            path: "a.py".to_string(),
            fingerprint: fp(10, 1),
            facts: facts("a.py"),
        };
        fs::write(
            entry_file(dir.path(), "a.py"),
            serde_json::to_vec(&entry).unwrap(),
        )
        .unwrap();
        let cache = AnalysisCache::open(dir.path()).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.take_diagnostics().len(), 1);
    }
}
