//! Group-by aggregation over tables.
//!
//! The built-in operations form a closed set ([`Aggregation`]). Anything
//! else plugs in through [`AggregateStrategy`] and
//! [`Aggregation::Custom`].
//!
//! ```
//! use acdb_table::{Aggregation, GroupBy, Row, Table, Value};
//!
//! let submissions = Table::from_rows(vec![
//!     Row::new().with("user_id", "alice").with("epoch_second", 10),
//!     Row::new().with("user_id", "bob").with("epoch_second", 20),
//!     Row::new().with("user_id", "alice").with("epoch_second", 30),
//! ]);
//!
//! let per_user = GroupBy::new(&submissions, "user_id")
//!     .size("submits")
//!     .agg("epoch_second", Aggregation::Max, "last_seen")
//!     .finish();
//!
//! assert_eq!(per_user.len(), 2);
//! assert_eq!(per_user.rows()[0].get("submits"), Some(&Value::Integer(2)));
//! assert_eq!(per_user.rows()[0].get("last_seen"), Some(&Value::Integer(30)));
//! ```

use crate::table::{Row, RowKey, Table};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A named, user-supplied aggregation.
pub trait AggregateStrategy: Send + Sync + fmt::Debug {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Reduces the non-null values of one group to a single value.
    fn aggregate(&self, values: &[&Value]) -> Value;
}

/// Supported reductions.
#[derive(Debug, Clone)]
pub enum Aggregation {
    /// Number of non-null values.
    Count,
    /// Number of distinct non-null values.
    Distinct,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Sum; stays integral when every input is an integer.
    Sum,
    /// Arithmetic mean.
    Mean,
    /// First value in table order.
    First,
    /// Last value in table order.
    Last,
    /// A custom strategy.
    Custom(Arc<dyn AggregateStrategy>),
}

impl Aggregation {
    /// Name of the operation.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Aggregation::Count => "count",
            Aggregation::Distinct => "distinct",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::First => "first",
            Aggregation::Last => "last",
            Aggregation::Custom(s) => s.name(),
        }
    }

    /// Applies the reduction. `values` excludes nulls.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
    pub fn apply(&self, values: &[&Value]) -> Value {
        match self {
            Aggregation::Count => Value::Integer(values.len() as i64),
            Aggregation::Distinct => {
                let mut seen: Vec<String> = values.iter().map(|v| v.canonical()).collect();
                seen.sort();
                seen.dedup();
                Value::Integer(seen.len() as i64)
            }
            Aggregation::Min => values
                .iter()
                .min_by(|a, b| a.total_cmp(b))
                .map_or(Value::Null, |v| (*v).clone()),
            Aggregation::Max => values
                .iter()
                .max_by(|a, b| match a.total_cmp(b) {
                    // keep the first maximum
                    Ordering::Equal => Ordering::Greater,
                    o => o,
                })
                .map_or(Value::Null, |v| (*v).clone()),
            Aggregation::Sum => sum(values),
            Aggregation::Mean => {
                let nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                if nums.is_empty() {
                    Value::Null
                } else {
                    Value::Float(nums.iter().sum::<f64>() / nums.len() as f64)
                }
            }
            Aggregation::First => values.first().map_or(Value::Null, |v| (*v).clone()),
            Aggregation::Last => values.last().map_or(Value::Null, |v| (*v).clone()),
            Aggregation::Custom(s) => s.aggregate(values),
        }
    }
}

impl FromStr for Aggregation {
    type Err = String;

    /// Parses a built-in operation by name.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "count" => Ok(Aggregation::Count),
            "distinct" => Ok(Aggregation::Distinct),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "sum" => Ok(Aggregation::Sum),
            "mean" => Ok(Aggregation::Mean),
            "first" => Ok(Aggregation::First),
            "last" => Ok(Aggregation::Last),
            other => Err(format!("unknown aggregation {other:?}")),
        }
    }
}

fn sum(values: &[&Value]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    if values.iter().all(|v| matches!(v, Value::Integer(_))) {
        Value::Integer(values.iter().filter_map(|v| v.as_i64()).sum())
    } else {
        Value::Float(values.iter().filter_map(|v| v.as_f64()).sum())
    }
}

/// Builder for a group-by over one key column.
///
/// Groups appear in the output in first-appearance order.
#[derive(Debug)]
pub struct GroupBy<'a> {
    table: &'a Table,
    key: String,
    distinct_on: Option<Vec<String>>,
    size: Option<String>,
    aggs: Vec<(String, Aggregation, String)>,
}

impl<'a> GroupBy<'a> {
    /// Starts a group-by on `key`.
    pub fn new(table: &'a Table, key: impl Into<String>) -> Self {
        Self {
            table,
            key: key.into(),
            distinct_on: None,
            size: None,
            aggs: Vec::new(),
        }
    }

    /// Drops duplicate `(key, columns...)` rows before grouping.
    #[must_use]
    pub fn distinct_on<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.distinct_on = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a column holding the row count of each group.
    #[must_use]
    pub fn size(mut self, target: impl Into<String>) -> Self {
        self.size = Some(target.into());
        self
    }

    /// Adds an aggregated column.
    #[must_use]
    pub fn agg(mut self, source: impl Into<String>, op: Aggregation, target: impl Into<String>) -> Self {
        self.aggs.push((source.into(), op, target.into()));
        self
    }

    /// Runs the aggregation.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn finish(self) -> Table {
        let deduped;
        let table = match &self.distinct_on {
            Some(cols) => {
                let mut key_cols = vec![self.key.clone()];
                key_cols.extend(cols.iter().cloned());
                deduped = self.table.drop_duplicates(&key_cols);
                &deduped
            }
            None => self.table,
        };

        let mut order: Vec<(RowKey, Value)> = Vec::new();
        let mut groups: HashMap<RowKey, Vec<&Row>> = HashMap::new();
        for row in table {
            let Some(k) = row.get(&self.key) else {
                continue;
            };
            let rk = row.key(&[self.key.as_str()]);
            groups
                .entry(rk.clone())
                .or_insert_with(|| {
                    order.push((rk, k.clone()));
                    Vec::new()
                })
                .push(row);
        }

        order
            .into_iter()
            .map(|(rk, key_value)| {
                let rows = groups.get(&rk).map(Vec::as_slice).unwrap_or_default();
                let mut out = Row::new().with(self.key.clone(), key_value);
                if let Some(size) = &self.size {
                    out.insert(size.clone(), rows.len() as i64);
                }
                for (source, op, target) in &self.aggs {
                    let values: Vec<&Value> = rows
                        .iter()
                        .filter_map(|r| r.get(source))
                        .filter(|v| !v.is_null())
                        .collect();
                    out.insert(target.clone(), op.apply(&values));
                }
                out
            })
            .collect()
    }
}
