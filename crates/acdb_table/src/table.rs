//! Rows, keys and ordered tables.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A record: column name to value.
///
/// Columns are kept sorted so that equal rows always encode to equal bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Sets a column, returning the previous value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(column.into(), value.into())
    }

    /// Gets a column value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Removes a column.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    /// Returns true if the column is present (even when null).
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Iterates over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds the key of this row over the given columns.
    ///
    /// Missing columns contribute a null component.
    #[must_use]
    pub fn key<S: AsRef<str>>(&self, columns: &[S]) -> RowKey {
        let parts: Vec<String> = columns
            .iter()
            .map(|c| self.get(c.as_ref()).map_or_else(|| Value::Null.canonical(), Value::canonical))
            .collect();
        RowKey(parts.join("\u{1f}"))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Hashable identity of a row over a column set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(String);

impl RowKey {
    /// Returns the raw joined representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An ordered table of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table from rows, keeping their order.
    #[must_use]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrows the rows.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consumes the table, returning its rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Iterates over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Appends a row.
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Appends all rows of another table.
    pub fn append(&mut self, other: Table) {
        self.rows.extend(other.rows);
    }

    /// Returns the last row.
    #[must_use]
    pub fn last(&self) -> Option<&Row> {
        self.rows.last()
    }

    /// Returns a table with rows from `start` onward.
    #[must_use]
    pub fn slice_from(&self, start: usize) -> Table {
        Table::from_rows(self.rows.get(start..).map(<[Row]>::to_vec).unwrap_or_default())
    }

    /// Keeps the first `len` rows.
    pub fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    /// Splits off the rows from `at` onward into a new table.
    ///
    /// `at` is clamped to the table length.
    #[must_use]
    pub fn split_off(&mut self, at: usize) -> Table {
        let at = at.min(self.rows.len());
        Table::from_rows(self.rows.split_off(at))
    }

    /// Iterates over one column; rows lacking it yield nothing.
    pub fn column<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows.iter().filter_map(move |r| r.get(column))
    }

    /// Distinct values of a column in first-appearance order.
    #[must_use]
    pub fn distinct(&self, column: &str) -> Vec<Value> {
        let mut seen = HashSet::new();
        self.column(column)
            .filter(|v| seen.insert(v.canonical()))
            .cloned()
            .collect()
    }

    /// Set of row keys over the given columns.
    #[must_use]
    pub fn key_set<S: AsRef<str>>(&self, columns: &[S]) -> HashSet<RowKey> {
        self.rows.iter().map(|r| r.key(columns)).collect()
    }

    /// Stable sort by one column, ascending.
    pub fn sort_by_column(&mut self, column: &str) {
        self.rows.sort_by(|a, b| {
            let null = Value::Null;
            a.get(column)
                .unwrap_or(&null)
                .total_cmp(b.get(column).unwrap_or(&null))
        });
    }

    /// Returns the rows whose key has not been seen yet, keeping the first
    /// occurrence and the original order.
    ///
    /// `seen` is updated with every key that is kept.
    #[must_use]
    pub fn retain_unseen<S: AsRef<str>>(
        self,
        columns: &[S],
        seen: &mut HashSet<RowKey>,
    ) -> Table {
        let rows = self
            .rows
            .into_iter()
            .filter(|r| seen.insert(r.key(columns)))
            .collect();
        Table { rows }
    }

    /// Drops duplicate rows over `columns`, keeping first occurrences.
    #[must_use]
    pub fn drop_duplicates<S: AsRef<str>>(&self, columns: &[S]) -> Table {
        let mut seen = HashSet::new();
        self.clone().retain_unseen(columns, &mut seen)
    }
}

impl FromIterator<Row> for Table {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Table {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
