//! Versioned JSON artifacts handed to external consumers.
//!
//! Every list is sorted and every map is a `BTreeMap`, so serialising the same
//! model twice gives byte-identical files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::FileFacts;
use crate::error::{AnalysisError, Diagnostic};
use crate::metrics::{CallRecord, EntityRecord, FileLines, MetricsInput, MetricsReport};
use crate::model::{
    CallEdge, CallKind, Callee, DependencyKind, EntityIdx, EntityKind, Project, UnresolvedReason,
};
use crate::resolve::Resolution;
use crate::scanner::Language;

pub const ARTIFACT_VERSION: u32 = 1;

pub const STRUCTURE_FILE: &str = "structure.json";
pub const CALLS_FILE: &str = "calls.json";
pub const DEPENDENCIES_FILE: &str = "dependencies.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.json";

// =============================================================================
// structure.json
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub name: String,
    pub path: String,
    pub languages: Vec<Language>,
    pub files: usize,
    pub entities: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub language: Language,
    pub module: String,
    pub loc: usize,
    pub comment_lines: usize,
    pub blank_lines: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityArtifact {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub name: String,
    pub qualified_name: String,
    pub module: String,
    pub file: String,
    pub line: usize,
    pub end_line: usize,
    /// Callable children, for types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,
    #[serde(default)]
    pub parameters: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureArtifact {
    pub version: u32,
    pub partial: bool,
    pub project: ProjectSummary,
    pub files: Vec<FileRecord>,
    pub entities: Vec<EntityArtifact>,
}

// =============================================================================
// calls.json
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnresolvedCallee {
    pub name: String,
    pub reason: UnresolvedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: CallKind,
    pub line: usize,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unresolved: Option<UnresolvedCallee>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerRecord {
    pub caller: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallsArtifact {
    pub version: u32,
    pub partial: bool,
    pub edges: Vec<EdgeRecord>,
    /// Group-by-callee view of `edges`.
    pub reverse_calls: BTreeMap<String, Vec<CallerRecord>>,
}

impl CallsArtifact {
    /// Sort `edges` and derive `reverse_calls` from them.
    pub fn from_edges(partial: bool, mut edges: Vec<EdgeRecord>) -> Self {
        edges.sort();
        let mut reverse_calls: BTreeMap<String, Vec<CallerRecord>> = BTreeMap::new();
        for edge in &edges {
            reverse_calls
                .entry(edge.to.clone())
                .or_default()
                .push(CallerRecord {
                    caller: edge.from.clone(),
                    file: edge.file.clone(),
                    line: edge.line,
                });
        }
        Self {
            version: ARTIFACT_VERSION,
            partial,
            edges,
            reverse_calls,
        }
    }
}

/// Artifact form of a resolved call edge.
pub fn edge_record(resolution: &Resolution, edge: &CallEdge) -> EdgeRecord {
    let symbols = &resolution.symbols;
    let (to, unresolved) = match &edge.callee {
        Callee::Entity(idx) => (symbols.entity(*idx).id.clone(), None),
        Callee::Unresolved { name, reason } => (
            Callee::placeholder(name, *reason),
            Some(UnresolvedCallee {
                name: name.clone(),
                reason: *reason,
            }),
        ),
    };
    EdgeRecord {
        from: symbols.entity(edge.caller).id.clone(),
        to,
        kind: edge.kind,
        line: edge.line,
        file: edge.file.clone(),
        unresolved,
    }
}

// =============================================================================
// dependencies.json
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleLink {
    pub module: String,
    pub symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub module: String,
    pub imports: Vec<ModuleLink>,
    /// Derived from the `imports` of other modules.
    pub imported_by: Vec<ModuleLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: DependencyKind,
    pub symbols: Vec<String>,
    pub file: String,
    pub line: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependenciesArtifact {
    pub version: u32,
    pub partial: bool,
    pub modules: Vec<ModuleRecord>,
    pub edges: Vec<DependencyRecord>,
    pub cycles: Vec<Vec<String>>,
}

impl DependenciesArtifact {
    /// Build module records from `edges`; `imported_by` is derived here.
    pub fn from_edges(
        partial: bool,
        modules: impl IntoIterator<Item = String>,
        mut edges: Vec<DependencyRecord>,
        cycles: Vec<Vec<String>>,
    ) -> Self {
        edges.sort();
        let mut records: BTreeMap<String, (Vec<ModuleLink>, Vec<ModuleLink>)> = modules
            .into_iter()
            .map(|m| (m, (Vec::new(), Vec::new())))
            .collect();
        for edge in edges.iter().filter(|e| e.kind.is_import()) {
            let link = ModuleLink {
                module: edge.target.clone(),
                symbols: edge.symbols.clone(),
                external: edge.external,
            };
            records
                .entry(edge.source.clone())
                .or_default()
                .0
                .push(link);
            if !edge.external {
                records
                    .entry(edge.target.clone())
                    .or_default()
                    .1
                    .push(ModuleLink {
                        module: edge.source.clone(),
                        symbols: edge.symbols.clone(),
                        external: false,
                    });
            }
        }
        let modules = records
            .into_iter()
            .map(|(module, (mut imports, mut imported_by))| {
                imports.sort();
                imported_by.sort();
                ModuleRecord {
                    module,
                    imports,
                    imported_by,
                }
            })
            .collect();
        Self {
            version: ARTIFACT_VERSION,
            partial,
            modules,
            edges,
            cycles,
        }
    }
}

// =============================================================================
// metrics.json / diagnostics.json
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsArtifact {
    pub version: u32,
    pub partial: bool,
    #[serde(flatten)]
    pub report: MetricsReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsArtifact {
    pub version: u32,
    pub partial: bool,
    pub diagnostics: Vec<Diagnostic>,
}

// =============================================================================
// ArtifactSet
// =============================================================================

/// The five artifacts of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSet {
    pub structure: StructureArtifact,
    pub calls: CallsArtifact,
    pub dependencies: DependenciesArtifact,
    pub metrics: MetricsArtifact,
    pub diagnostics: DiagnosticsArtifact,
}

impl ArtifactSet {
    pub fn from_model(
        project: &Project,
        facts: &[FileFacts],
        resolution: &Resolution,
        metrics: MetricsReport,
        diagnostics: &[Diagnostic],
        partial: bool,
    ) -> Self {
        let symbols = &resolution.symbols;

        let mut files: Vec<FileRecord> = facts
            .iter()
            .map(|f| FileRecord {
                path: f.path.clone(),
                language: f.language,
                module: f.module.clone(),
                loc: f.lines.code,
                comment_lines: f.lines.comment,
                blank_lines: f.lines.blank,
                parse_error: f.parse_error.clone(),
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let id_of = |idx: EntityIdx| symbols.entity(idx).id.clone();
        let mut entities: Vec<EntityArtifact> = symbols
            .entities()
            .iter()
            .map(|e| EntityArtifact {
                id: e.id.clone(),
                kind: e.kind,
                name: e.name.clone(),
                qualified_name: e.qualified_name.clone(),
                module: e.module.clone(),
                file: e.file.clone(),
                line: e.line,
                end_line: e.end_line,
                methods: if e.kind.is_type() {
                    e.children
                        .iter()
                        .filter(|c| symbols.entity(**c).kind.is_callable())
                        .map(|c| id_of(*c))
                        .collect()
                } else {
                    Vec::new()
                },
                parent: e.parent.map(id_of),
                children: e.children.iter().map(|c| id_of(*c)).collect(),
                bases: e.bases.iter().map(|b| id_of(*b)).collect(),
                complexity: e.complexity,
                parameters: e.parameter_count,
            })
            .collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));

        let structure = StructureArtifact {
            version: ARTIFACT_VERSION,
            partial,
            project: ProjectSummary {
                name: project.name.clone(),
                path: project.root.display().to_string(),
                languages: project.languages.iter().copied().collect(),
                files: files.len(),
                entities: entities.len(),
                total_bytes: project.total_bytes,
            },
            files,
            entities,
        };

        let calls = CallsArtifact::from_edges(
            partial,
            resolution
                .calls
                .edges()
                .iter()
                .map(|edge| edge_record(resolution, edge))
                .collect(),
        );

        let dependencies = DependenciesArtifact::from_edges(
            partial,
            resolution.deps.modules().iter().cloned(),
            resolution
                .deps
                .edges()
                .iter()
                .map(|e| DependencyRecord {
                    source: e.source.clone(),
                    target: e.target.clone(),
                    kind: e.kind,
                    symbols: e.symbols.clone(),
                    file: e.file.clone(),
                    line: e.line,
                    external: e.external,
                })
                .collect(),
            resolution.deps.cycles().to_vec(),
        );

        let mut diagnostics = diagnostics.to_vec();
        diagnostics.sort();
        diagnostics.dedup();

        Self {
            structure,
            calls,
            dependencies,
            metrics: MetricsArtifact {
                version: ARTIFACT_VERSION,
                partial,
                report: metrics,
            },
            diagnostics: DiagnosticsArtifact {
                version: ARTIFACT_VERSION,
                partial,
                diagnostics,
            },
        }
    }

    pub fn partial(&self) -> bool {
        self.structure.partial
    }

    /// Serialised files, in a fixed order.
    pub fn render(&self) -> Result<Vec<(&'static str, Vec<u8>)>, AnalysisError> {
        Ok(vec![
            (STRUCTURE_FILE, to_json(&self.structure)?),
            (CALLS_FILE, to_json(&self.calls)?),
            (DEPENDENCIES_FILE, to_json(&self.dependencies)?),
            (METRICS_FILE, to_json(&self.metrics)?),
            (DIAGNOSTICS_FILE, to_json(&self.diagnostics)?),
        ])
    }

    pub fn write_to_dir(&self, dir: &Path) -> Result<(), AnalysisError> {
        fs::create_dir_all(dir).map_err(|source| AnalysisError::ArtifactIo {
            path: dir.to_path_buf(),
            source,
        })?;
        for (name, content) in self.render()? {
            let path = dir.join(name);
            fs::write(&path, content).map_err(|source| AnalysisError::ArtifactIo { path, source })?;
        }
        Ok(())
    }

    pub fn read_from_dir(dir: &Path) -> Result<Self, AnalysisError> {
        Ok(Self {
            structure: read_json(&dir.join(STRUCTURE_FILE))?,
            calls: read_json(&dir.join(CALLS_FILE))?,
            dependencies: read_json(&dir.join(DEPENDENCIES_FILE))?,
            metrics: read_json(&dir.join(METRICS_FILE))?,
            diagnostics: read_json(&dir.join(DIAGNOSTICS_FILE))?,
        })
    }

    /// Calculator input rebuilt from the structure and call artifacts.
    pub fn metrics_input(&self) -> MetricsInput {
        MetricsInput {
            files: self
                .structure
                .files
                .iter()
                .map(|f| FileLines {
                    path: f.path.clone(),
                    code: f.loc,
                    comment: f.comment_lines,
                })
                .collect(),
            entities: self
                .structure
                .entities
                .iter()
                .map(|e| EntityRecord {
                    id: e.id.clone(),
                    kind: e.kind,
                    file: e.file.clone(),
                    parent: e.parent.clone(),
                    complexity: e.complexity,
                    parameter_count: e.parameters,
                })
                .collect(),
            calls: self
                .calls
                .edges
                .iter()
                .map(|e| CallRecord {
                    caller: e.from.clone(),
                    callee: e.to.clone(),
                    resolved: e.unresolved.is_none(),
                })
                .collect(),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, AnalysisError> {
    let mut out = serde_json::to_vec_pretty(value)?;
    out.push(b'\n');
    Ok(out)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, AnalysisError> {
    let content = fs::read(path).map_err(|source| AnalysisError::ArtifactIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_slice(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str, line: usize) -> EdgeRecord {
        EdgeRecord {
            from: from.to_string(),
            to: to.to_string(),
            kind: CallKind::DirectCall,
            line,
            file: "b.py".to_string(),
            unresolved: None,
        }
    }

    #[test]
    fn test_reverse_calls_grouped_from_edges() {
        let calls = CallsArtifact::from_edges(
            false,
            vec![
                edge("func:g", "func:X.m", 20),
                edge("func:f", "func:X.m", 10),
                edge("func:f", "func:h", 11),
            ],
        );
        assert_eq!(calls.edges[0].from, "func:f");
        let callers: Vec<usize> = calls.reverse_calls["func:X.m"].iter().map(|c| c.line).collect();
        assert_eq!(callers, vec![10, 20]);
        assert_eq!(calls.reverse_calls.len(), 2);
    }

    #[test]
    fn test_imported_by_is_derived() {
        let record = |source: &str, target: &str, external: bool| DependencyRecord {
            source: source.to_string(),
            target: target.to_string(),
            kind: DependencyKind::Import,
            symbols: vec!["x".to_string()],
            file: format!("{}.py", source),
            line: 1,
            external,
        };
        let deps = DependenciesArtifact::from_edges(
            false,
            ["a".to_string(), "b".to_string()],
            vec![record("a", "b", false), record("a", "os", true)],
            Vec::new(),
        );
        assert_eq!(deps.modules.len(), 2);
        assert_eq!(deps.modules[0].imports.len(), 2);
        assert!(deps.modules[0].imported_by.is_empty());
        assert_eq!(deps.modules[1].imported_by[0].module, "a");
    }

    #[test]
    fn test_unresolved_edge_serialises_reason() {
        let mut record = edge("func:f", "external:get", 3);
        record.kind = CallKind::External;
        record.unresolved = Some(UnresolvedCallee {
            name: "get".to_string(),
            reason: UnresolvedReason::ExternalImport,
        });
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"external\""));
        assert!(json.contains("\"reason\":\"external_import\""));
    }
}
