//! # acdb Table
//!
//! Row/table data model for acdb datasets.
//!
//! This crate provides:
//! - [`Value`], a dynamic cell type
//! - [`Row`] and [`Table`], ordered records with key helpers
//! - Deterministic JSON-lines encoding ([`to_jsonl`], [`from_jsonl`])
//! - Consumer-side operations: [`Filter`] and [`GroupBy`]
//!
//! This is a pure data crate with no I/O operations.
//!
//! ## Usage
//!
//! ```
//! use acdb_table::{from_jsonl, to_jsonl, Row, Table};
//!
//! let table = Table::from_rows(vec![Row::new().with("id", 1).with("user", "alice")]);
//! let bytes = to_jsonl(&table).unwrap();
//! assert_eq!(from_jsonl(&bytes).unwrap(), table);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aggregate;
mod codec;
mod error;
mod filter;
mod table;
mod value;

pub use aggregate::{AggregateStrategy, Aggregation, GroupBy};
pub use codec::{from_jsonl, to_jsonl};
pub use error::{TableError, TableResult};
pub use filter::Filter;
pub use table::{Row, RowKey, Table};
pub use value::Value;
