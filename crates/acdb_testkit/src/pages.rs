//! Page bodies and the matching parser.
//!
//! Scripted pages are JSON arrays of row objects, read back by
//! [`json_rows`].

use acdb_sync_engine::{ParseError, ParseOutcome};
use acdb_table::{Row, Table};

/// Parses a JSON array of objects into rows.
///
/// # Errors
///
/// Returns [`ParseError`] if the payload is not such an array.
pub fn json_rows(raw: &[u8]) -> Result<ParseOutcome, ParseError> {
    let rows: Vec<Row> = serde_json::from_slice(raw)?;
    Ok(ParseOutcome::Rows(Table::from_rows(rows)))
}

/// Encodes rows as a page body for [`json_rows`].
#[must_use]
pub fn rows_body(rows: &[Row]) -> Vec<u8> {
    serde_json::to_vec(rows).unwrap_or_default()
}

/// An event row with integer `id` and epoch second `t`.
#[must_use]
pub fn event(id: i64, t: i64) -> Row {
    Row::new().with("id", id).with("t", t)
}

/// Events whose id and time both run over `ids`.
pub fn events(ids: impl IntoIterator<Item = i64>) -> Vec<Row> {
    ids.into_iter().map(|i| event(i, i)).collect()
}
