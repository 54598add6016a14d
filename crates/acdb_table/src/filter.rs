//! Row predicates.

use crate::table::{Row, Table};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A predicate over one column.
///
/// A row lacking the column never matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// `column == value`.
    Eq {
        /// Column name.
        column: String,
        /// Expected value.
        value: Value,
    },
    /// `column` is one of `values`.
    In {
        /// Column name.
        column: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// `min <= column <= max`.
    Range {
        /// Column name.
        column: String,
        /// Inclusive lower bound.
        min: Value,
        /// Inclusive upper bound.
        max: Value,
    },
}

impl Filter {
    /// Shorthand for [`Filter::Eq`].
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Shorthand for [`Filter::In`].
    pub fn one_of<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Shorthand for [`Filter::Range`].
    pub fn range(column: impl Into<String>, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        Filter::Range {
            column: column.into(),
            min: min.into(),
            max: max.into(),
        }
    }

    /// The column this filter reads.
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. } | Filter::In { column, .. } | Filter::Range { column, .. } => {
                column
            }
        }
    }

    /// Tests a row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        let Some(cell) = row.get(self.column()) else {
            return false;
        };
        match self {
            Filter::Eq { value, .. } => cell.canonical() == value.canonical(),
            Filter::In { values, .. } => {
                let c = cell.canonical();
                values.iter().any(|v| v.canonical() == c)
            }
            Filter::Range { min, max, .. } => {
                cell.total_cmp(min) != Ordering::Less && cell.total_cmp(max) != Ordering::Greater
            }
        }
    }
}

impl Table {
    /// Returns the rows matching every filter, in order.
    #[must_use]
    pub fn filter(&self, filters: &[Filter]) -> Table {
        self.iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .cloned()
            .collect()
    }
}
