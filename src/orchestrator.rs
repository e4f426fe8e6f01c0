//! Run pipeline: scan, parallel parse with cache reuse, one resolution pass,
//! metrics and artifacts.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Instant;

use crossbeam_channel::Receiver;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::analysis::{AnalyzerRegistry, FileFacts, LanguageAnalyzer};
use crate::artifacts::{edge_record, ArtifactSet};
use crate::cache::AnalysisCache;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Diagnostic, DiagnosticKind};
use crate::metrics::{self, MetricsInput};
use crate::model::{FileDescriptor, RunStatus};
use crate::progress::{self, BatchUpdate, ProgressMessage, ProgressPublisher};
use crate::resolve::{self, Resolution};
use crate::scanner;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub files_scanned: usize,
    /// Files parsed in this run (cache misses).
    pub files_parsed: usize,
    pub cache_hits: usize,
    pub resolution_passes: usize,
}

pub struct AnalysisOutcome {
    pub status: RunStatus,
    pub artifacts: ArtifactSet,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: RunStats,
}

/// Result of parsing one file on a worker.
struct Parsed {
    facts: FileFacts,
    diagnostics: Vec<Diagnostic>,
    /// Whether the facts can be cached.
    cacheable: bool,
}

pub struct Orchestrator {
    config: AnalysisConfig,
    registry: AnalyzerRegistry,
    cache: AnalysisCache,
    subscribers: Vec<ProgressPublisher>,
}

impl Orchestrator {
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            config,
            registry: AnalyzerRegistry::with_defaults(),
            cache: AnalysisCache::in_memory(),
            subscribers: Vec::new(),
        })
    }

    pub fn with_cache(mut self, cache: AnalysisCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_registry(mut self, registry: AnalyzerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    /// Progress for the next run. The channel ends with a `Finished` message.
    pub fn subscribe(&mut self) -> Receiver<ProgressMessage> {
        let (publisher, receiver) = progress::channel(self.config.progress_buffer);
        self.subscribers.push(publisher);
        receiver
    }

    fn publish(&mut self, update: BatchUpdate) {
        for subscriber in &mut self.subscribers {
            subscriber.publish(update.clone());
        }
    }

    fn finish(&mut self, status: RunStatus) {
        for mut subscriber in std::mem::take(&mut self.subscribers) {
            subscriber.finish(status);
        }
    }

    /// Analyze the project at `root`.
    ///
    /// Only an unreadable root (or a worker pool that cannot start) fails the
    /// run; every other problem is reported in the outcome's diagnostics.
    pub fn run(&mut self, root: &Path) -> Result<AnalysisOutcome, AnalysisError> {
        match self.run_inner(root) {
            Ok(outcome) => {
                self.finish(outcome.status);
                Ok(outcome)
            }
            Err(e) => {
                warn!("analysis of {} failed: {}", root.display(), e);
                self.finish(RunStatus::Failed);
                Err(e)
            }
        }
    }

    fn run_inner(&mut self, root: &Path) -> Result<AnalysisOutcome, AnalysisError> {
        let started = Instant::now();
        let scan = scanner::scan(root, &self.config)?;
        let mut diagnostics = scan.diagnostics;
        diagnostics.extend(self.cache.take_diagnostics());
        let mut partial = scan.truncated
            || diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::ResourceLimitExceeded);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| AnalysisError::InvalidConfig(format!("cannot start worker pool: {}", e)))?;

        let total = scan.files.len();
        let mut stats = RunStats {
            files_scanned: total,
            ..RunStats::default()
        };
        let mut facts: Vec<FileFacts> = Vec::with_capacity(total);
        let mut fresh: Vec<(&FileDescriptor, FileFacts)> = Vec::new();
        let mut fact_bytes: u64 = 0;
        let mut processed = 0;

        for batch in scan.files.chunks(self.config.batch_size) {
            if started.elapsed() >= self.config.timeout() {
                warn!(
                    "time budget of {}s exhausted after {} of {} files",
                    self.config.timeout_secs, processed, total
                );
                diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::TimeoutExceeded,
                    format!(
                        "time budget of {}s exhausted; {} of {} files analyzed",
                        self.config.timeout_secs, processed, total
                    ),
                ));
                partial = true;
                break;
            }
            if fact_bytes > self.config.memory_limit_bytes() {
                warn!(
                    "memory budget of {} MB exhausted after {} of {} files",
                    self.config.memory_limit_mb, processed, total
                );
                diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::ResourceLimitExceeded,
                    format!(
                        "memory budget of {} MB exhausted; {} of {} files analyzed",
                        self.config.memory_limit_mb, processed, total
                    ),
                ));
                partial = true;
                break;
            }

            let mut misses = Vec::new();
            for descriptor in batch {
                match self.cache.lookup(&descriptor.path, &descriptor.fingerprint) {
                    Some(cached) => {
                        stats.cache_hits += 1;
                        fact_bytes += cached.estimated_bytes();
                        diagnostics.extend(parse_diagnostics(&cached));
                        facts.push(cached);
                    }
                    None => misses.push(descriptor),
                }
            }

            let registry = &self.registry;
            let parsed: Vec<(&FileDescriptor, Parsed)> = pool.install(|| {
                misses
                    .par_iter()
                    .map(|descriptor| (*descriptor, parse_file(registry, descriptor)))
                    .collect()
            });
            for (descriptor, result) in parsed {
                stats.files_parsed += 1;
                fact_bytes += result.facts.estimated_bytes();
                diagnostics.extend(result.diagnostics);
                if result.cacheable {
                    fresh.push((descriptor, result.facts.clone()));
                }
                facts.push(result.facts);
            }

            processed += batch.len();
            debug!("parsed batch: {}/{} files", processed, total);
            self.publish(BatchUpdate::counters(processed, total));
        }
        info!(
            "parse stage: {} parsed, {} from cache",
            stats.files_parsed, stats.cache_hits
        );

        let resolution = resolve::resolve(&facts, &self.registry);
        stats.resolution_passes += 1;
        diagnostics.extend(resolution.diagnostics.iter().cloned());

        self.publish_resolved(&scan.files, &resolution, processed, total);

        let report = metrics::compute(
            &MetricsInput::from_model(&facts, &resolution.symbols, &resolution.calls),
            self.config.hotspot_count,
        );

        for (descriptor, file_facts) in fresh {
            self.cache
                .insert(&descriptor.path, descriptor.fingerprint, file_facts);
        }
        if !partial {
            let present: BTreeSet<String> = scan.files.iter().map(|f| f.path.clone()).collect();
            let pruned = self.cache.retain_paths(&present);
            if pruned > 0 {
                debug!("pruned {} cache entries for removed files", pruned);
            }
        }
        if let Err(e) = self.cache.persist() {
            warn!("failed to persist analysis cache: {}", e);
        }

        let status = if partial {
            RunStatus::Partial
        } else {
            RunStatus::Complete
        };
        let artifacts = ArtifactSet::from_model(
            &scan.project,
            &facts,
            &resolution,
            report,
            &diagnostics,
            partial,
        );
        info!(
            "analysis {} in {:?}: {} files, {} entities, {} call edges",
            status,
            started.elapsed(),
            facts.len(),
            resolution.symbols.entities().len(),
            resolution.calls.len()
        );

        Ok(AnalysisOutcome {
            status,
            diagnostics: artifacts.diagnostics.diagnostics.clone(),
            artifacts,
            stats,
        })
    }

    /// Send resolved entities and edges in batches of `batch_size` files.
    fn publish_resolved(
        &mut self,
        files: &[FileDescriptor],
        resolution: &Resolution,
        processed: usize,
        total: usize,
    ) {
        if self.subscribers.is_empty() {
            return;
        }
        for batch in files.chunks(self.config.batch_size) {
            let paths: BTreeSet<&str> = batch.iter().map(|f| f.path.as_str()).collect();
            let entities_added = resolution
                .symbols
                .entities()
                .iter()
                .filter(|e| paths.contains(e.file.as_str()))
                .map(|e| e.id.clone())
                .collect();
            let edges_added = resolution
                .calls
                .edges()
                .iter()
                .filter(|e| paths.contains(e.file.as_str()))
                .map(|e| edge_record(resolution, e))
                .collect();
            let update = BatchUpdate {
                entities_added,
                edges_added,
                files_processed: processed,
                files_total: total,
            };
            if update.carries_data() {
                self.publish(update);
            }
        }
    }
}

fn parse_file(registry: &AnalyzerRegistry, descriptor: &FileDescriptor) -> Parsed {
    let path = Path::new(&descriptor.path);
    let Some(analyzer) = registry.for_language(descriptor.language) else {
        return Parsed {
            facts: FileFacts::empty(&descriptor.path, descriptor.language, &descriptor.path),
            diagnostics: vec![Diagnostic::warning(
                DiagnosticKind::FileSkipped,
                format!("skipped: no analyzer for {}", descriptor.language),
            )
            .in_file(&descriptor.path)],
            cacheable: false,
        };
    };

    let source = match fs::read(&descriptor.abs_path) {
        Ok(source) => source,
        Err(e) => {
            return Parsed {
                facts: failed_facts(analyzer, descriptor),
                diagnostics: vec![Diagnostic::warning(
                    DiagnosticKind::FileSkipped,
                    format!("skipped: {}", e),
                )
                .in_file(&descriptor.path)],
                cacheable: false,
            };
        }
    };

    match analyzer
        .parse(path, &source)
        .and_then(|parsed| analyzer.extract_facts(&parsed))
    {
        Ok(facts) => Parsed {
            diagnostics: parse_diagnostics(&facts),
            facts,
            cacheable: true,
        },
        Err(e) => {
            let mut facts = failed_facts(analyzer, descriptor);
            facts.parse_error = Some(format!("parse failed: {}", e));
            Parsed {
                diagnostics: parse_diagnostics(&facts),
                facts,
                cacheable: true,
            }
        }
    }
}

/// Parse problems recorded in `facts`, for fresh and cached files alike.
fn parse_diagnostics(facts: &FileFacts) -> Vec<Diagnostic> {
    facts
        .parse_error
        .iter()
        .map(|message| {
            Diagnostic::warning(DiagnosticKind::ParseError, message.clone()).in_file(&facts.path)
        })
        .collect()
}

/// Facts without entities for a file that could not be parsed. The module
/// name is what the analyzer gives an empty file at the same path.
fn failed_facts(analyzer: &dyn LanguageAnalyzer, descriptor: &FileDescriptor) -> FileFacts {
    let module = analyzer
        .parse(Path::new(&descriptor.path), b"")
        .map(|parsed| analyzer.module_name(&parsed))
        .unwrap_or_else(|_| descriptor.path.clone());
    FileFacts::empty(&descriptor.path, descriptor.language, &module)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_run_reports_progress_and_status() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def f():\n    return 1\n");
        write(dir.path(), "b.py", "from a import f\n\nf()\n");

        let mut orchestrator = Orchestrator::new(AnalysisConfig::default()).unwrap();
        let receiver = orchestrator.subscribe();
        let outcome = orchestrator.run(dir.path()).unwrap();
        assert_eq!(outcome.status, RunStatus::Complete);
        assert_eq!(outcome.stats.files_parsed, 2);
        assert_eq!(outcome.stats.resolution_passes, 1);

        let messages: Vec<ProgressMessage> = receiver.try_iter().collect();
        assert_eq!(
            messages.last(),
            Some(&ProgressMessage::Finished {
                status: RunStatus::Complete
            })
        );
        let entities: usize = messages
            .iter()
            .map(|m| match m {
                ProgressMessage::Batch(update) => update.entities_added.len(),
                ProgressMessage::Finished { .. } => 0,
            })
            .sum();
        assert_eq!(entities, outcome.artifacts.structure.entities.len());
    }

    #[test]
    fn test_zero_timeout_gives_partial() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def f():\n    pass\n");
        let config = AnalysisConfig {
            timeout_secs: 0,
            ..AnalysisConfig::default()
        };
        let mut orchestrator = Orchestrator::new(config).unwrap();
        let outcome = orchestrator.run(dir.path()).unwrap();
        assert_eq!(outcome.status, RunStatus::Partial);
        assert!(outcome.artifacts.partial());
        assert_eq!(outcome.stats.resolution_passes, 1);
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::TimeoutExceeded));
    }

    #[test]
    fn test_missing_root_fails_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(AnalysisConfig::default()).unwrap();
        let receiver = orchestrator.subscribe();
        assert!(orchestrator.run(&dir.path().join("missing")).is_err());
        let messages: Vec<ProgressMessage> = receiver.try_iter().collect();
        assert_eq!(
            messages,
            vec![ProgressMessage::Finished {
                status: RunStatus::Failed
            }]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AnalysisConfig {
            batch_size: 0,
            ..AnalysisConfig::default()
        };
        assert!(Orchestrator::new(config).is_err());
    }
}
