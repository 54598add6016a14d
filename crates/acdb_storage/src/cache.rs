//! Cache store trait definition.

use crate::error::StoreResult;
use crate::request::RequestId;
use acdb_table::Table;

/// Persistent home of dataset tables and raw remote responses.
///
/// The two halves are independent: a raw entry can exist without a table
/// and vice versa.
///
/// # Invariants
///
/// - `save` replaces the whole table atomically; a crash leaves either the
///   old or the new table visible, never a mix
/// - `save` is the only operation that changes what `load` observes
/// - raw entries are keyed by [`RequestId`] and never interpreted
///
/// # Implementors
///
/// - [`super::FileCacheStore`] - For persistent storage
/// - [`super::MemoryCacheStore`] - For testing
pub trait CacheStore: Send + Sync {
    /// Loads the table of a dataset, or `None` when it was never saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the table exists but cannot be read or decoded.
    fn load(&self, dataset: &str) -> StoreResult<Option<Table>>;

    /// Replaces the table of a dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be encoded or written.
    fn save(&self, dataset: &str, table: &Table) -> StoreResult<()>;

    /// Removes the table of a dataset. Returns true if one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn remove(&self, dataset: &str) -> StoreResult<bool>;

    /// Loads a raw response.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry exists but cannot be read.
    fn load_raw(&self, request: &RequestId) -> StoreResult<Option<Vec<u8>>>;

    /// Stores a raw response.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    fn save_raw(&self, request: &RequestId, bytes: &[u8]) -> StoreResult<()>;

    /// Drops every raw response of a dataset, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be removed.
    fn clear_raw(&self, dataset: &str) -> StoreResult<usize>;
}
