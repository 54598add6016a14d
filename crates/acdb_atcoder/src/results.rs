//! Per-contest result listings.

use crate::rating::adjust_perf;
use acdb_sync_engine::{ParseError, ParseOutcome};
use acdb_table::{Row, Table};
use chrono::DateTime;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Standing {
    contest_screen_name: String,
    end_time: String,
    user_screen_name: String,
    country: Option<String>,
    affiliation: Option<String>,
    place: i64,
    old_rating: i64,
    new_rating: i64,
    performance: i64,
    is_rated: bool,
}

impl Standing {
    fn into_row(self) -> Result<Row, ParseError> {
        let end = DateTime::parse_from_rfc3339(&self.end_time)
            .map_err(|e| ParseError::new(format!("bad end time {:?}: {e}", self.end_time)))?
            .timestamp();
        // "abc300.contest.atcoder.jp" -> "abc300"
        let contest_id = self
            .contest_screen_name
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();
        let perf = if self.is_rated {
            adjust_perf(self.performance)
        } else {
            0
        };
        Ok(Row::new()
            .with("contest_id", contest_id)
            .with("end_epoch_second", end)
            .with("user_id", self.user_screen_name)
            .with("country", self.country)
            .with("affiliation", self.affiliation)
            .with("place", self.place)
            .with("old_rate", self.old_rating)
            .with("new_rate", self.new_rating)
            .with("perf", perf)
            .with("user_rated", i64::from(self.is_rated)))
    }
}

/// Parses the result listing of one contest.
///
/// An empty listing means the results are not final yet; it is set aside
/// so the contest stays on the worklist.
///
/// # Errors
///
/// Returns [`ParseError`] if the payload is not a result listing.
pub fn parse_results(raw: &[u8]) -> Result<ParseOutcome, ParseError> {
    let standings: Vec<Standing> = serde_json::from_slice(raw)?;
    if standings.is_empty() {
        warn!("empty result listing, results are not final yet");
        return Ok(ParseOutcome::empty("results not final yet"));
    }
    let rows = standings
        .into_iter()
        .map(Standing::into_row)
        .collect::<Result<Vec<Row>, ParseError>>()?;
    Ok(ParseOutcome::Rows(Table::from_rows(rows)))
}
