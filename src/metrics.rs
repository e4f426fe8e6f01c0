//! Per-file and project-level code metrics.
//!
//! Every value is a pure function of [`MetricsInput`]: line counts per file,
//! the entity list with complexities, and the call edges. The same input can
//! be assembled from a live resolution or from read-back artifacts.
//!
//! Formulas:
//! - LOC: non-blank, non-comment lines.
//! - Cyclomatic complexity: sum over the callables declared in the file.
//! - Maintainability index (SEI, normalised to 0..100):
//!   `(171 - 0.23*CC - 16.2*ln(LOC) + 50*sin(sqrt(2.4*CM))) * 100 / 171`
//!   where `CM` is the comment share of non-blank lines; 100 for empty files.
//! - Technical-debt ratio: remediation minutes / (LOC * 30).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::analysis::FileFacts;
use crate::model::{Callee, EntityKind};
use crate::resolve::{CallGraph, SymbolTable};

/// Minutes needed to write one line of code, the SQALE development cost.
pub const MINUTES_PER_LINE: f64 = 30.0;

/// Remediation cost weights and thresholds.
pub mod remediation {
    pub const COMPLEXITY_THRESHOLD: u32 = 10;
    pub const MINUTES_PER_COMPLEXITY_POINT: u32 = 10;
    pub const GOD_CLASS_METHODS: usize = 10;
    pub const MINUTES_PER_GOD_CLASS: u32 = 30;
    pub const PARAMETER_THRESHOLD: usize = 5;
    pub const MINUTES_PER_LONG_PARAMETER_LIST: u32 = 15;
}

/// Number of entries in the most-called list.
pub const MOST_CALLED_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLines {
    pub path: String,
    pub code: usize,
    pub comment: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: String,
    pub kind: EntityKind,
    pub file: String,
    pub parent: Option<String>,
    pub complexity: Option<u32>,
    pub parameter_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub caller: String,
    pub callee: String,
    pub resolved: bool,
}

/// Everything the calculator reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsInput {
    pub files: Vec<FileLines>,
    pub entities: Vec<EntityRecord>,
    pub calls: Vec<CallRecord>,
}

impl MetricsInput {
    pub fn from_model(facts: &[FileFacts], symbols: &SymbolTable, calls: &CallGraph) -> Self {
        let files = facts
            .iter()
            .map(|f| FileLines {
                path: f.path.clone(),
                code: f.lines.code,
                comment: f.lines.comment,
            })
            .collect();
        let entities = symbols
            .entities()
            .iter()
            .map(|e| EntityRecord {
                id: e.id.clone(),
                kind: e.kind,
                file: e.file.clone(),
                parent: e.parent.map(|p| symbols.entity(p).id.clone()),
                complexity: e.complexity,
                parameter_count: e.parameter_count,
            })
            .collect();
        let calls = calls
            .edges()
            .iter()
            .map(|edge| {
                let (callee, resolved) = match &edge.callee {
                    Callee::Entity(idx) => (symbols.entity(*idx).id.clone(), true),
                    Callee::Unresolved { name, reason } => (Callee::placeholder(name, *reason), false),
                };
                CallRecord {
                    caller: symbols.entity(edge.caller).id.clone(),
                    callee,
                    resolved,
                }
            })
            .collect();
        Self {
            files,
            entities,
            calls,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub file: String,
    pub loc: usize,
    pub cyclomatic_complexity: u32,
    pub maintainability_index: f64,
    pub technical_debt_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotspot {
    pub file: String,
    pub cyclomatic_complexity: u32,
    pub loc: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalledEntity {
    pub id: String,
    pub calls: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStats {
    pub total_calls: usize,
    pub resolved_calls: usize,
    pub unresolved_calls: usize,
    pub unique_callers: usize,
    pub unique_callees: usize,
    pub most_called: Vec<CalledEntity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetrics {
    pub files: usize,
    pub total_loc: usize,
    pub total_entities: usize,
    pub total_complexity: u32,
    /// Mean per-file complexity.
    pub mean_complexity: f64,
    pub mean_maintainability_index: f64,
    pub mean_technical_debt_ratio: f64,
    pub complexity_hotspots: Vec<Hotspot>,
    pub calls: CallStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub files: Vec<FileMetrics>,
    pub overall: ProjectMetrics,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Normalised maintainability index, rounded to 2 decimals.
pub fn maintainability_index(loc: usize, complexity: u32, comment_lines: usize) -> f64 {
    if loc == 0 {
        return 100.0;
    }
    let comment_share = comment_lines as f64 / (loc + comment_lines) as f64;
    let raw = 171.0 - 0.23 * complexity as f64 - 16.2 * (loc as f64).ln()
        + 50.0 * (2.4 * comment_share).sqrt().sin();
    round_to((raw * 100.0 / 171.0).clamp(0.0, 100.0), 2)
}

/// Remediation minutes over development minutes, rounded to 4 decimals.
pub fn technical_debt_ratio(loc: usize, remediation_minutes: u32) -> f64 {
    if loc == 0 {
        return 0.0;
    }
    round_to(remediation_minutes as f64 / (loc as f64 * MINUTES_PER_LINE), 4)
}

fn remediation_minutes<'a>(
    entities: impl Iterator<Item = &'a EntityRecord>,
    method_counts: &HashMap<&str, usize>,
) -> u32 {
    use remediation::*;

    let mut minutes = 0;
    for entity in entities {
        if entity.kind.is_callable() {
            let cc = entity.complexity.unwrap_or(1);
            if cc > COMPLEXITY_THRESHOLD {
                minutes += (cc - COMPLEXITY_THRESHOLD) * MINUTES_PER_COMPLEXITY_POINT;
            }
            if entity.parameter_count > PARAMETER_THRESHOLD {
                minutes += MINUTES_PER_LONG_PARAMETER_LIST;
            }
        } else if entity.kind.is_type()
            && method_counts.get(entity.id.as_str()).copied().unwrap_or(0) > GOD_CLASS_METHODS
        {
            minutes += MINUTES_PER_GOD_CLASS;
        }
    }
    minutes
}

fn call_stats(calls: &[CallRecord]) -> CallStats {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut callers = BTreeSet::new();
    let mut resolved = 0;
    for call in calls {
        callers.insert(call.caller.as_str());
        if call.resolved {
            resolved += 1;
            *counts.entry(call.callee.as_str()).or_insert(0) += 1;
        }
    }
    let unique_callees = counts.len();
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    CallStats {
        total_calls: calls.len(),
        resolved_calls: resolved,
        unresolved_calls: calls.len() - resolved,
        unique_callers: callers.len(),
        unique_callees,
        most_called: ranked
            .into_iter()
            .take(MOST_CALLED_COUNT)
            .map(|(id, calls)| CalledEntity {
                id: id.to_string(),
                calls,
            })
            .collect(),
    }
}

/// Compute file metrics and the overall block.
pub fn compute(input: &MetricsInput, hotspot_count: usize) -> MetricsReport {
    let mut by_file: HashMap<&str, Vec<&EntityRecord>> = HashMap::new();
    let mut method_counts: HashMap<&str, usize> = HashMap::new();
    for entity in &input.entities {
        by_file.entry(entity.file.as_str()).or_default().push(entity);
        if let (true, Some(parent)) = (entity.kind.is_callable(), &entity.parent) {
            *method_counts.entry(parent.as_str()).or_insert(0) += 1;
        }
    }

    let mut lines: Vec<&FileLines> = input.files.iter().collect();
    lines.sort_by(|a, b| a.path.cmp(&b.path));

    let mut files = Vec::with_capacity(lines.len());
    for file in lines {
        let entities = by_file.get(file.path.as_str()).map(|v| v.as_slice()).unwrap_or(&[]);
        let complexity: u32 = entities
            .iter()
            .filter(|e| e.kind.is_callable())
            .map(|e| e.complexity.unwrap_or(1))
            .sum();
        let minutes = remediation_minutes(entities.iter().copied(), &method_counts);
        files.push(FileMetrics {
            file: file.path.clone(),
            loc: file.code,
            cyclomatic_complexity: complexity,
            maintainability_index: maintainability_index(file.code, complexity, file.comment),
            technical_debt_ratio: technical_debt_ratio(file.code, minutes),
        });
    }

    let count = files.len();
    let total_loc = files.iter().map(|f| f.loc).sum();
    let total_complexity: u32 = files.iter().map(|f| f.cyclomatic_complexity).sum();
    let mean = |sum: f64, decimals: i32| {
        if count == 0 {
            0.0
        } else {
            round_to(sum / count as f64, decimals)
        }
    };

    let mut ranked: Vec<&FileMetrics> = files.iter().collect();
    ranked.sort_by(|a, b| {
        b.cyclomatic_complexity
            .cmp(&a.cyclomatic_complexity)
            .then_with(|| b.loc.cmp(&a.loc))
            .then_with(|| a.file.cmp(&b.file))
    });
    let complexity_hotspots = ranked
        .into_iter()
        .take(hotspot_count)
        .map(|f| Hotspot {
            file: f.file.clone(),
            cyclomatic_complexity: f.cyclomatic_complexity,
            loc: f.loc,
        })
        .collect();

    let overall = ProjectMetrics {
        files: count,
        total_loc,
        total_entities: input.entities.len(),
        total_complexity,
        mean_complexity: mean(total_complexity as f64, 2),
        mean_maintainability_index: mean(files.iter().map(|f| f.maintainability_index).sum(), 2),
        mean_technical_debt_ratio: mean(files.iter().map(|f| f.technical_debt_ratio).sum(), 4),
        complexity_hotspots,
        calls: call_stats(&input.calls),
    };

    MetricsReport { files, overall }
}
