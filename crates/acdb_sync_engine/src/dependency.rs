//! Dependency evaluation.
//!
//! Evaluation reads markers and, for virtual markers, the cached table. It
//! never modifies either. Every constraint is evaluated; the result is the
//! maximum severity over all failures.

use crate::registry::{CompareOp, Dependency, DependencyKind, SelfMarker};
use acdb_storage::{Marker, Markers, SyncStates};
use acdb_table::{Table, Value};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Outcome of dependency evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Severity {
    /// Every constraint holds.
    #[default]
    Fresh,
    /// Fetch the missing tail.
    Soft,
    /// Reset, then fetch from scratch.
    Hard,
}

impl Severity {
    /// Returns true unless fresh.
    pub fn is_stale(&self) -> bool {
        !matches!(self, Severity::Fresh)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Fresh => "fresh",
            Severity::Soft => "soft-stale",
            Severity::Hard => "hard-stale",
        })
    }
}

/// A constraint that did not hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// The constraint.
    pub dependency: Dependency,
    /// Resolved left-hand side, gap applied. `None` when missing.
    pub self_value: Option<Marker>,
    /// Resolved right-hand side. `None` when missing.
    pub other_value: Option<Marker>,
    /// For `set_ge`: elements of `other` absent from `self`.
    pub missing: Vec<Value>,
}

/// Result of evaluating all constraints of a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Maximum severity.
    pub severity: Severity,
    /// Every failed constraint, in declaration order.
    pub failures: Vec<Failure>,
}

/// Evaluates `dependencies` of `dataset`.
///
/// `markers` are the dataset's own markers, `others` the markers of every
/// other dataset, `now` the current epoch second and `table` the cached
/// table used by virtual markers.
pub fn evaluate(
    dataset: &str,
    dependencies: &[Dependency],
    markers: &Markers,
    others: &SyncStates,
    now: i64,
    table: &Table,
) -> Evaluation {
    let mut evaluation = Evaluation::default();

    for dep in dependencies {
        let self_value = resolve_self(&dep.self_marker, markers, now, table)
            .and_then(|v| apply_gap(v, dep.gap));
        let other_value = others
            .marker(&dep.other_dataset, &dep.other_marker)
            .filter(|m| !m.is_null())
            .cloned();

        let (holds, missing) = match (&self_value, &other_value) {
            (Some(a), Some(b)) => compare(a, dep.op, b),
            _ => (false, Vec::new()),
        };
        if holds {
            continue;
        }

        let severity = match dep.kind {
            DependencyKind::Soft => Severity::Soft,
            DependencyKind::Hard => Severity::Hard,
        };
        evaluation.severity = evaluation.severity.max(severity);

        warn!(
            dataset = %dataset,
            kind = ?dep.kind,
            self_value = %self::display(self_value.as_ref()),
            op = ?dep.op,
            other = %format!("{}.{}", dep.other_dataset, dep.other_marker),
            other_value = %self::display(other_value.as_ref()),
            "broken dependency"
        );
        if dep.op == CompareOp::SetGe && !missing.is_empty() {
            let diff: Vec<String> = missing.iter().map(ToString::to_string).collect();
            warn!(dataset = %dataset, diff = ?diff, "set_ge diff");
        }

        evaluation.failures.push(Failure {
            dependency: dep.clone(),
            self_value,
            other_value,
            missing,
        });
    }

    evaluation
}

fn display(marker: Option<&Marker>) -> String {
    marker.map_or_else(|| "missing".to_string(), ToString::to_string)
}

fn resolve_self(marker: &SelfMarker, markers: &Markers, now: i64, table: &Table) -> Option<Marker> {
    match marker {
        SelfMarker::Now => Some(Marker::Integer(now)),
        SelfMarker::Marker(name) => markers.get(name).filter(|m| !m.is_null()).cloned(),
        SelfMarker::Virtual { column } => Some(Marker::List(table.distinct(column))),
    }
}

fn apply_gap(value: Marker, gap: Option<i64>) -> Option<Marker> {
    let Some(gap) = gap else {
        return Some(value);
    };
    #[allow(clippy::cast_precision_loss)]
    match value {
        Marker::Integer(i) => Some(Marker::Integer(i.saturating_add(gap))),
        Marker::Float(f) => Some(Marker::Float(f + gap as f64)),
        // a gap on a non-numeric marker cannot hold
        _ => None,
    }
}

fn compare(a: &Marker, op: CompareOp, b: &Marker) -> (bool, Vec<Value>) {
    match op {
        CompareOp::Lt => match (a, b) {
            (Marker::Integer(x), Marker::Integer(y)) => (x < y, Vec::new()),
            (Marker::Text(x), Marker::Text(y)) => (x < y, Vec::new()),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x < y, Vec::new()),
                _ => (false, Vec::new()),
            },
        },
        CompareOp::Eq => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) if !matches!((a, b), (Marker::Integer(_), Marker::Integer(_))) => {
                (x == y, Vec::new())
            }
            _ => (a == b, Vec::new()),
        },
        CompareOp::SetGe => {
            let (Some(mine), Some(theirs)) = (as_set(a), as_set(b)) else {
                return (false, Vec::new());
            };
            let have: HashSet<String> = mine.iter().map(Value::canonical).collect();
            let mut reported = HashSet::new();
            let missing: Vec<Value> = theirs
                .iter()
                .filter(|v| !have.contains(&v.canonical()))
                .filter(|v| reported.insert(v.canonical()))
                .cloned()
                .collect();
            (missing.is_empty(), missing)
        }
    }
}

fn as_set(marker: &Marker) -> Option<Vec<Value>> {
    match marker {
        Marker::List(values) => Some(values.clone()),
        Marker::Null => None,
        scalar => scalar.to_value().map(|v| vec![v]),
    }
}
