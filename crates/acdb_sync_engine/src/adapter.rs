//! Source adapters and the parser boundary.
//!
//! The four adapter kinds are the variants of [`SourceSpec`]. Each derives
//! an initial [`Cursor`], turns a cursor into a [`RequestId`] plus the
//! cursor after it, and decides when the loop is exhausted.

use crate::registry::{PaginatedConfig, SourceSpec, TimeSeriesConfig, WorklistConfig};
use acdb_storage::{Marker, RequestId};
use acdb_table::{Table, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Position of a fetch loop. Never persisted directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    /// Everything from this ordering value on.
    After(Value),
    /// A page number.
    Page(u64),
    /// Keys still to fetch, next first.
    Worklist(VecDeque<Value>),
    /// The only request of a single-shot source.
    Once,
}

impl Cursor {
    /// Marker form, stored as `last_cursor` after a sync.
    ///
    /// A worklist is rebuilt from its source on every sync, so only the key
    /// it would fetch next is kept.
    #[must_use]
    pub fn to_marker(&self) -> Marker {
        match self {
            Cursor::After(v) => Marker::from_value(v),
            Cursor::Page(n) => Marker::Integer(i64::try_from(*n).unwrap_or(i64::MAX)),
            Cursor::Worklist(keys) => keys.front().map_or(Marker::Null, Marker::from_value),
            Cursor::Once => Marker::Null,
        }
    }

    /// The request this cursor is about to make, without the rest of a
    /// worklist.
    #[must_use]
    pub fn head(&self) -> Cursor {
        match self {
            Cursor::Worklist(keys) => Cursor::Worklist(keys.front().cloned().into_iter().collect()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::After(v) => write!(f, "after {v}"),
            Cursor::Page(n) => write!(f, "page {n}"),
            Cursor::Worklist(keys) => write!(f, "worklist#{}", keys.len()),
            Cursor::Once => f.write_str("once"),
        }
    }
}

/// What a parser made of a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Parsed rows. May be empty.
    Rows(Table),
    /// Nothing usable yet; try again on a later sync.
    Empty {
        /// Why the payload was set aside.
        reason: String,
    },
}

impl ParseOutcome {
    /// Creates an [`ParseOutcome::Empty`].
    pub fn empty(reason: impl Into<String>) -> Self {
        ParseOutcome::Empty {
            reason: reason.into(),
        }
    }

    /// Returns true when no rows were produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            ParseOutcome::Rows(t) => t.is_empty(),
            ParseOutcome::Empty { .. } => true,
        }
    }
}

/// A payload the parser cannot make sense of. Fatal for the fetch loop.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
}

impl ParseError {
    /// Creates a parse error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("invalid JSON: {e}"))
    }
}

/// Turns one raw response into rows.
///
/// Rows must carry at least the dataset's uniqueness and ordering columns.
pub trait Parser: Send + Sync {
    /// Parses a payload.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the payload is malformed.
    fn parse(&self, raw: &[u8]) -> Result<ParseOutcome, ParseError>;
}

impl<F> Parser for F
where
    F: Fn(&[u8]) -> Result<ParseOutcome, ParseError> + Send + Sync,
{
    fn parse(&self, raw: &[u8]) -> Result<ParseOutcome, ParseError> {
        self(raw)
    }
}

/// Parsers by name, as referenced from the registry.
#[derive(Clone, Default)]
pub struct Parsers {
    by_name: HashMap<String, Arc<dyn Parser>>,
}

impl Parsers {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parser.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, parser: impl Parser + 'static) -> Self {
        self.by_name.insert(name.into(), Arc::new(parser));
        self
    }

    /// Looks up a parser.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Parser>> {
        self.by_name.get(name).cloned()
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

impl fmt::Debug for Parsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("Parsers").field("names", &names).finish()
    }
}

/// Inputs for deriving the first cursor.
#[derive(Debug, Clone, Copy)]
pub struct CursorContext<'a> {
    /// The dataset's merged-so-far table.
    pub table: &'a Table,
    /// The worklist source table, for worklist datasets.
    pub source: Option<&'a Table>,
}

impl SourceSpec {
    /// First cursor of a sync, or `None` when there is nothing to fetch.
    #[must_use]
    pub fn initial_cursor(&self, ctx: CursorContext<'_>) -> Option<Cursor> {
        match self {
            SourceSpec::TimeSeries(c) => Some(Cursor::After(tail_value(c, ctx.table))),
            SourceSpec::Paginated(c) => Some(Cursor::Page(c.first_page)),
            SourceSpec::Worklist(c) => {
                let keys = worklist(c, ctx.table, ctx.source?);
                (!keys.is_empty()).then_some(Cursor::Worklist(keys))
            }
            SourceSpec::SingleShot(_) => Some(Cursor::Once),
        }
    }

    /// Request for `cursor`, and the cursor after it.
    ///
    /// Time-series cursors are re-derived from the tail of `merged`, so the
    /// returned cursor only records where the request started.
    #[must_use]
    pub fn next_request(
        &self,
        dataset: &str,
        cursor: Cursor,
        merged: &Table,
    ) -> (RequestId, Option<Cursor>) {
        let url = self.url();
        match (self, cursor) {
            (SourceSpec::TimeSeries(c), Cursor::After(origin)) => {
                let value = if merged.is_empty() {
                    origin
                } else {
                    tail_value(c, merged)
                };
                let id = RequestId::new(dataset, url, value.to_string());
                (id, Some(Cursor::After(value)))
            }
            (SourceSpec::Paginated(c), Cursor::Page(n)) => {
                let id = RequestId::new(dataset, url, n.to_string());
                (id, next_page(c, n))
            }
            (SourceSpec::Worklist(_), Cursor::Worklist(mut keys)) => match keys.pop_front() {
                Some(key) => {
                    let id = RequestId::new(dataset, url, key.to_string());
                    (id, (!keys.is_empty()).then_some(Cursor::Worklist(keys)))
                }
                None => (RequestId::new(dataset, url, ""), None),
            },
            (_, other) => {
                // single-shot, or a cursor of a foreign kind: one request, then stop
                let value = match other {
                    Cursor::Once => String::new(),
                    c => c.to_marker().to_string(),
                };
                (RequestId::new(dataset, url, value), None)
            }
        }
    }

    /// Drops pages that are still being produced by the origin.
    ///
    /// A time-series page whose rows share a single ordering value is the
    /// newest second of the stream and may still grow; it is set aside and
    /// picked up again on a later sync. This is specific to append-only
    /// submission logs, not a general completeness rule.
    #[must_use]
    pub fn screen(&self, page: Table) -> ParseOutcome {
        match self {
            SourceSpec::TimeSeries(c) if !page.is_empty() && page.distinct(&c.ordering).len() <= 1 => {
                ParseOutcome::empty(format!(
                    "{} rows share one {} value, origin still producing",
                    page.len(),
                    c.ordering
                ))
            }
            _ => ParseOutcome::Rows(page),
        }
    }

    /// Returns true when the loop must stop after `fetched`.
    #[must_use]
    pub fn is_exhausted(&self, fetched: &Table, next: Option<&Cursor>) -> bool {
        if next.is_none() {
            return true;
        }
        match self {
            SourceSpec::TimeSeries(c) => c.page_size.is_some_and(|size| fetched.len() < size),
            _ => false,
        }
    }

    /// Cursor a later sync would resume from.
    #[must_use]
    pub fn resume_cursor(&self, last: Option<Cursor>, merged: &Table) -> Option<Cursor> {
        match self {
            SourceSpec::TimeSeries(c) if !merged.is_empty() => Some(Cursor::After(tail_value(c, merged))),
            _ => last,
        }
    }
}

fn tail_value(config: &TimeSeriesConfig, table: &Table) -> Value {
    table
        .last()
        .and_then(|row| row.get(&config.ordering))
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| config.origin.clone())
}

fn next_page(config: &PaginatedConfig, page: u64) -> Option<Cursor> {
    let next = page.checked_add(1)?;
    match config.max_pages {
        Some(max) if next - config.first_page >= max => None,
        _ => Some(Cursor::Page(next)),
    }
}

fn worklist(config: &WorklistConfig, table: &Table, source: &Table) -> VecDeque<Value> {
    let mut candidates = source.filter(&config.predicate);
    if let Some(column) = &config.order_by {
        candidates.sort_by_column(column);
        let mut rows = candidates.into_rows();
        rows.reverse();
        candidates = Table::from_rows(rows);
    }

    let loaded: HashSet<String> = table
        .column(&config.key_column)
        .map(Value::canonical)
        .collect();
    let mut queued = HashSet::new();
    candidates
        .column(&config.key_column)
        .filter(|k| !k.is_null())
        .filter(|k| !loaded.contains(&k.canonical()))
        .filter(|k| queued.insert(k.canonical()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SingleShotConfig;
    use acdb_table::{Filter, Row};

    fn events(values: &[i64]) -> Table {
        values.iter().map(|v| Row::new().with("id", *v).with("t", *v)).collect()
    }

    #[test]
    fn time_series_resumes_from_tail() {
        let spec = SourceSpec::TimeSeries(TimeSeriesConfig::new("https://x/from/{}", "t").with_page_size(20));
        let table = events(&[98, 99, 100]);
        let cursor = spec
            .initial_cursor(CursorContext { table: &table, source: None })
            .unwrap();
        assert_eq!(cursor, Cursor::After(Value::Integer(100)));

        let (id, next) = spec.next_request("s", cursor, &table);
        assert_eq!(id.url(), "https://x/from/100");
        assert!(!spec.is_exhausted(&events(&[1; 20]), next.as_ref()));
        assert!(spec.is_exhausted(&events(&[1; 19]), next.as_ref()));

        let empty = Table::new();
        let first = spec
            .initial_cursor(CursorContext { table: &empty, source: None })
            .unwrap();
        assert_eq!(first, Cursor::After(Value::Integer(0)));
    }

    #[test]
    fn time_series_screens_single_ordering_value() {
        let spec = SourceSpec::TimeSeries(TimeSeriesConfig::new("u{}", "t"));
        let page: Table = (0..3).map(|i| Row::new().with("id", i).with("t", 7)).collect();
        assert!(matches!(spec.screen(page), ParseOutcome::Empty { .. }));
        assert!(matches!(spec.screen(events(&[7, 8])), ParseOutcome::Rows(_)));

        let listing = SourceSpec::Paginated(PaginatedConfig::new("u{}"));
        assert!(matches!(listing.screen(events(&[7])), ParseOutcome::Rows(_)));
    }

    #[test]
    fn pages_advance_until_cap() {
        let spec = SourceSpec::Paginated(PaginatedConfig::new("https://x?page={}").with_max_pages(2));
        let table = Table::new();
        let c = spec.initial_cursor(CursorContext { table: &table, source: None }).unwrap();
        let (id, next) = spec.next_request("c", c, &table);
        assert_eq!(id.value, "1");
        assert_eq!(next, Some(Cursor::Page(2)));
        let (id, next) = spec.next_request("c", Cursor::Page(2), &table);
        assert_eq!(id.value, "2");
        assert_eq!(next, None);
        assert!(spec.is_exhausted(&table, next.as_ref()));
    }

    #[test]
    fn worklist_filters_sorts_and_skips_loaded() {
        let contests = Table::from_rows(vec![
            Row::new().with("contest_id", "abc1").with("rated", 1).with("start", 10),
            Row::new().with("contest_id", "arc1").with("rated", 0).with("start", 20),
            Row::new().with("contest_id", "abc2").with("rated", 1).with("start", 30),
            Row::new().with("contest_id", "abc3").with("rated", 1).with("start", 40),
        ]);
        let results = Table::from_rows(vec![Row::new().with("contest_id", "abc2").with("user_id", "u")]);
        let spec = SourceSpec::Worklist(
            WorklistConfig::new("https://x/{}/results/json", "contests", "contest_id")
                .with_predicate(Filter::equals("rated", 1))
                .most_recent_first("start"),
        );

        let cursor = spec
            .initial_cursor(CursorContext { table: &results, source: Some(&contests) })
            .unwrap();
        let (first, next) = spec.next_request("results", cursor, &results);
        assert_eq!(first.url(), "https://x/abc3/results/json");
        let (second, next) = spec.next_request("results", next.unwrap(), &results);
        assert_eq!(second.value, "abc1");
        assert!(next.is_none());

        let everything = contests.clone();
        let done = spec.initial_cursor(CursorContext { table: &everything, source: Some(&contests) });
        assert!(done.is_none());
    }

    #[test]
    fn worklist_marker_keeps_only_the_next_key() {
        let keys: VecDeque<Value> = ["abc3", "abc2", "abc1"].into_iter().map(Value::from).collect();
        let cursor = Cursor::Worklist(keys);
        assert_eq!(cursor.to_marker(), Marker::Text("abc3".into()));
        assert_eq!(cursor.head(), Cursor::Worklist(VecDeque::from([Value::from("abc3")])));
        assert_eq!(Cursor::Worklist(VecDeque::new()).to_marker(), Marker::Null);
        assert_eq!(Cursor::Page(3).head(), Cursor::Page(3));
    }

    #[test]
    fn single_shot_requests_once() {
        let spec = SourceSpec::SingleShot(SingleShotConfig::new("https://x/models.json"));
        let table = Table::new();
        let c = spec.initial_cursor(CursorContext { table: &table, source: None }).unwrap();
        let (id, next) = spec.next_request("m", c, &table);
        assert_eq!(id.url(), "https://x/models.json");
        assert!(next.is_none());
        assert_eq!(spec.resume_cursor(next, &table), None);
    }

    #[test]
    fn closures_are_parsers() {
        let parsers = Parsers::new().with("noop", |_: &[u8]| -> Result<ParseOutcome, ParseError> {
            Ok(ParseOutcome::empty("nothing"))
        });
        let parser = parsers.get("noop").unwrap();
        assert!(parser.parse(b"").unwrap().is_empty());
        assert!(!parsers.contains("other"));
    }
}
