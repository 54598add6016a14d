//! Problem difficulty models.

use crate::rating::adjust_diff;
use acdb_sync_engine::{ParseError, ParseOutcome};
use acdb_table::{Row, Table};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ProblemModel {
    slope: Option<f64>,
    intercept: Option<f64>,
    difficulty: Option<f64>,
}

/// `abc300_a` -> `abc300`; ids with several underscores keep all but the
/// last part.
fn contest_of(problem_id: &str) -> String {
    match problem_id.rsplit_once('_') {
        Some((contest, _)) => contest.to_string(),
        None => String::new(),
    }
}

/// Parses the problem model listing, an object keyed by problem id.
///
/// Only models with difficulty, slope and intercept are kept. Rows come out
/// ordered by problem id.
///
/// # Errors
///
/// Returns [`ParseError`] if the payload is not such an object.
pub fn parse_problem_models(raw: &[u8]) -> Result<ParseOutcome, ParseError> {
    let models: BTreeMap<String, ProblemModel> = serde_json::from_slice(raw)?;
    let total = models.len();
    let table: Table = models
        .into_iter()
        .filter_map(|(problem_id, m)| {
            let (Some(difficulty), Some(slope), Some(intercept)) = (m.difficulty, m.slope, m.intercept) else {
                return None;
            };
            Some(
                Row::new()
                    .with("contest_id", contest_of(&problem_id))
                    .with("problem_id", problem_id)
                    .with("diff", adjust_diff(difficulty))
                    .with("tee", (slope * 4000.0 + intercept).exp()),
            )
        })
        .collect();
    debug!(total, kept = table.len(), "parsed problem models");
    Ok(ParseOutcome::Rows(table))
}
