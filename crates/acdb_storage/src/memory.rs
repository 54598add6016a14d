//! In-memory cache store for testing.

use crate::cache::CacheStore;
use crate::error::StoreResult;
use crate::request::RequestId;
use acdb_table::Table;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Table>,
    raw: HashMap<RequestId, Vec<u8>>,
    saves: usize,
}

/// A cache store kept in memory.
///
/// Clones share the same contents, so a test can hand one clone to an
/// engine and inspect the other.
///
/// ```rust
/// use acdb_storage::{CacheStore, MemoryCacheStore};
/// use acdb_table::{Row, Table};
///
/// let store = MemoryCacheStore::new();
/// let handle = store.clone();
/// store.save("t", &Table::from_rows(vec![Row::new().with("id", 1)])).unwrap();
/// assert_eq!(handle.load("t").unwrap().map(|t| t.len()), Some(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.inner.read().saves
    }

    /// Number of raw entries currently held.
    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.inner.read().raw.len()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, dataset: &str) -> StoreResult<Option<Table>> {
        Ok(self.inner.read().tables.get(dataset).cloned())
    }

    fn save(&self, dataset: &str, table: &Table) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.tables.insert(dataset.to_string(), table.clone());
        inner.saves += 1;
        Ok(())
    }

    fn remove(&self, dataset: &str) -> StoreResult<bool> {
        Ok(self.inner.write().tables.remove(dataset).is_some())
    }

    fn load_raw(&self, request: &RequestId) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.read().raw.get(request).cloned())
    }

    fn save_raw(&self, request: &RequestId, bytes: &[u8]) -> StoreResult<()> {
        self.inner.write().raw.insert(request.clone(), bytes.to_vec());
        Ok(())
    }

    fn clear_raw(&self, dataset: &str) -> StoreResult<usize> {
        let mut inner = self.inner.write();
        let before = inner.raw.len();
        inner.raw.retain(|k, _| k.dataset != dataset);
        Ok(before - inner.raw.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_raw_only_touches_one_dataset() {
        let store = MemoryCacheStore::new();
        store.save_raw(&RequestId::new("a", "u{}", "1"), b"x").unwrap();
        store.save_raw(&RequestId::new("a", "u{}", "2"), b"y").unwrap();
        store.save_raw(&RequestId::new("b", "u{}", "1"), b"z").unwrap();

        assert_eq!(store.clear_raw("a").unwrap(), 2);
        assert_eq!(store.raw_len(), 1);
    }
}
