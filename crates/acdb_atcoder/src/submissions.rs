//! Submission log pages.

use acdb_sync_engine::{ParseError, ParseOutcome};
use acdb_table::{Row, Table};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct Submission {
    id: i64,
    epoch_second: i64,
    problem_id: String,
    contest_id: String,
    user_id: String,
    language: String,
    point: f64,
    length: i64,
    result: String,
    execution_time: Option<i64>,
}

impl Submission {
    /// Judge progress such as `3/12` is reported in place of a verdict.
    fn is_judging(&self) -> bool {
        self.result.chars().any(|c| c.is_ascii_digit())
    }
}

impl From<Submission> for Row {
    fn from(s: Submission) -> Self {
        Row::new()
            .with("id", s.id)
            .with("epoch_second", s.epoch_second)
            .with("problem_id", s.problem_id)
            .with("contest_id", s.contest_id)
            .with("user_id", s.user_id)
            .with("language", s.language)
            .with("point", s.point)
            .with("length", s.length)
            .with("result", s.result)
            .with("execution_time", s.execution_time)
    }
}

/// Parses one page of the submission log.
///
/// A page holding a submission that is still being judged is set aside as
/// a whole, so the log is re-read from the same point later.
///
/// # Errors
///
/// Returns [`ParseError`] if the page is not a JSON array of submissions.
pub fn parse_submissions(raw: &[u8]) -> Result<ParseOutcome, ParseError> {
    let submissions: Vec<Submission> = serde_json::from_slice(raw)?;
    let judging = submissions.iter().filter(|s| s.is_judging()).count();
    if judging > 0 {
        info!(judging, "page has submissions under judgement");
        return Ok(ParseOutcome::empty(format!(
            "{judging} submissions under judgement"
        )));
    }
    Ok(ParseOutcome::Rows(
        submissions.into_iter().map(Row::from).collect::<Table>(),
    ))
}
