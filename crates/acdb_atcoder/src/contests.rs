//! Contest archive pages and the supplemental contest listing.

use crate::html;
use acdb_sync_engine::{ParseError, ParseOutcome};
use acdb_table::{Row, Table};
use chrono::DateTime;
use serde::Deserialize;
use tracing::debug;

/// Start time format of the archive, e.g. `2024-02-10 21:00:00+0900`.
const ARCHIVE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";

/// Contest type given to supplemental entries.
const SUPPLEMENT_TYPE: &str = "Algorithm";

fn contest_row(
    contest_id: impl Into<String>,
    start: i64,
    duration: i64,
    title: impl Into<String>,
    rated: bool,
    type_: impl Into<String>,
) -> Row {
    Row::new()
        .with("contest_id", contest_id.into())
        .with("start_epoch_second", start)
        .with("end_epoch_second", start + duration)
        .with("duration_second", duration)
        .with("title", title.into())
        .with("rated", i64::from(rated))
        .with("type_", type_.into())
}

/// Parses one page of the contest archive.
///
/// A page past the last one has no contest table and yields no rows.
///
/// # Errors
///
/// Returns [`ParseError`] if a contest row lacks one of its cells.
pub fn parse_archive(raw: &[u8]) -> Result<ParseOutcome, ParseError> {
    let page = String::from_utf8_lossy(raw);
    let Some(body) = html::slice_between_ci(&page, "<tbody", "</tbody>") else {
        debug!("archive page without contest table");
        return Ok(ParseOutcome::Rows(Table::new()));
    };

    let mut table = Table::new();
    for tr in html::blocks_ci(body, "<tr", "</tr>") {
        table.push(archive_row(tr)?);
    }
    Ok(ParseOutcome::Rows(table))
}

fn archive_row(tr: &str) -> Result<Row, ParseError> {
    let cells: Vec<&str> = html::blocks_ci(tr, "<td", "</td>").collect();
    let [when, name, length, rate_range, ..] = cells.as_slice() else {
        return Err(ParseError::new(format!(
            "contest row with {} cells: {}",
            cells.len(),
            html::strip_tags(tr)
        )));
    };

    let time = html::slice_between_ci(when, "<time", "</time>")
        .ok_or_else(|| ParseError::new("contest row without start time"))?;
    let start = DateTime::parse_from_str(time.trim(), ARCHIVE_TIME_FORMAT)
        .map_err(|e| ParseError::new(format!("bad start time {time:?}: {e}")))?
        .timestamp();

    let type_ = html::open_tag(name, "span")
        .and_then(|tag| html::attr(tag, "title"))
        .ok_or_else(|| ParseError::new("contest row without type"))?;
    let link = html::blocks_ci(name, "<a ", "</a>")
        .next()
        .ok_or_else(|| ParseError::new("contest row without link"))?;
    let href = html::open_tag(link, "a")
        .and_then(|tag| html::attr(tag, "href"))
        .ok_or_else(|| ParseError::new("contest link without href"))?;
    let contest_id = href
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let title = html::strip_tags(html::inner_after_open_tag(link));

    let duration = parse_duration(&html::strip_tags(length))?;
    let rated = html::strip_tags(rate_range) != "-";

    Ok(contest_row(contest_id, start, duration, title, rated, type_))
}

/// `HH:MM` into seconds. Hours may exceed 24.
fn parse_duration(text: &str) -> Result<i64, ParseError> {
    let (hours, minutes) = text
        .split_once(':')
        .ok_or_else(|| ParseError::new(format!("bad duration {text:?}")))?;
    let hours: i64 = hours
        .trim()
        .parse()
        .map_err(|_| ParseError::new(format!("bad duration {text:?}")))?;
    let minutes: i64 = minutes
        .trim()
        .parse()
        .map_err(|_| ParseError::new(format!("bad duration {text:?}")))?;
    Ok(hours * 3600 + minutes * 60)
}

#[derive(Debug, Deserialize)]
struct ListedContest {
    id: String,
    start_epoch_second: i64,
    duration_second: i64,
    title: String,
    rate_change: String,
}

/// Parses the supplemental contest listing.
///
/// The listing carries no contest type; every entry is taken as an
/// algorithm contest.
///
/// # Errors
///
/// Returns [`ParseError`] if the payload is not a JSON array of contests.
pub fn parse_contests_json(raw: &[u8]) -> Result<ParseOutcome, ParseError> {
    let listed: Vec<ListedContest> = serde_json::from_slice(raw)?;
    Ok(ParseOutcome::Rows(
        listed
            .into_iter()
            .map(|c| {
                contest_row(
                    c.id,
                    c.start_epoch_second,
                    c.duration_second,
                    c.title,
                    c.rate_change != "-",
                    SUPPLEMENT_TYPE,
                )
            })
            .collect(),
    ))
}
