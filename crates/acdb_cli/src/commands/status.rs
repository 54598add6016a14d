//! Status command implementation.

use acdb_sync_engine::{
    CompareOp, DatasetStatus, DependencyKind, Engine, Failure, HttpClient, SelfMarker,
};
use serde::Serialize;

/// Status of one dataset.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Dataset name.
    pub dataset: String,
    /// Adapter kind.
    pub kind: &'static str,
    /// Phase after evaluation.
    pub phase: String,
    /// Rows in memory, base snapshot included.
    pub rows: usize,
    /// Rows from the base snapshot.
    pub base_rows: usize,
    /// Failed dependencies, one line each.
    pub failures: Vec<String>,
    /// Persisted markers.
    pub markers: serde_json::Value,
}

impl StatusReport {
    fn from_status(status: DatasetStatus) -> Result<Self, serde_json::Error> {
        Ok(Self {
            dataset: status.name,
            kind: status.kind,
            phase: status.phase.to_string(),
            rows: status.rows,
            base_rows: status.base_rows,
            failures: status.evaluation.failures.iter().map(describe).collect(),
            markers: serde_json::to_value(&status.markers)?,
        })
    }
}

/// Runs the status command.
pub fn run<C: HttpClient>(engine: &mut Engine<C>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let reports = collect(engine)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        _ => {
            print_text_output(&reports);
        }
    }

    Ok(())
}

/// Loads and evaluates every dataset of the registry.
pub fn collect<C: HttpClient>(engine: &mut Engine<C>) -> Result<Vec<StatusReport>, Box<dyn std::error::Error>> {
    let names: Vec<String> = engine.registry().names().map(str::to_string).collect();
    let mut reports = Vec::with_capacity(names.len());
    for name in &names {
        reports.push(StatusReport::from_status(engine.status(name)?)?);
    }
    Ok(reports)
}

/// One line per failed dependency, e.g.
/// `soft: now -3600 < submissions.fetch_epoch_second (1700000000 vs 1699990000)`.
pub fn describe(failure: &Failure) -> String {
    let dep = &failure.dependency;
    let kind = match dep.kind {
        DependencyKind::Soft => "soft",
        DependencyKind::Hard => "hard",
    };
    let lhs = match &dep.self_marker {
        SelfMarker::Now => "now".to_string(),
        SelfMarker::Marker(name) => name.clone(),
        SelfMarker::Virtual { column } => format!("distinct({column})"),
    };
    let gap = dep.gap.map(|g| format!(" {g:+}")).unwrap_or_default();
    let op = match dep.op {
        CompareOp::Lt => "<",
        CompareOp::Eq => "==",
        CompareOp::SetGe => "contains",
    };
    let mut line = format!(
        "{kind}: {lhs}{gap} {op} {}.{} ({} vs {})",
        dep.other_dataset,
        dep.other_marker,
        shown(failure.self_value.as_ref()),
        shown(failure.other_value.as_ref()),
    );
    if !failure.missing.is_empty() {
        let missing: Vec<String> = failure.missing.iter().map(ToString::to_string).collect();
        line.push_str(&format!(", missing {}", missing.join(" ")));
    }
    line
}

fn shown<T: ToString>(value: Option<&T>) -> String {
    value.map_or_else(|| "missing".to_string(), ToString::to_string)
}

fn print_text_output(reports: &[StatusReport]) {
    println!("acdb Dataset Status");
    println!("===================");
    for report in reports {
        println!();
        println!("{} ({})", report.dataset, report.kind);
        println!("  Phase:     {}", report.phase);
        if report.base_rows > 0 {
            println!("  Rows:      {} ({} from base snapshot)", report.rows, report.base_rows);
        } else {
            println!("  Rows:      {}", report.rows);
        }
        for failure in &report.failures {
            println!("  Broken:    {failure}");
        }
    }
}
