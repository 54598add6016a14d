//! File-based cache store.

use crate::atomic::write_atomic;
use crate::cache::CacheStore;
use crate::error::{StoreError, StoreResult};
use crate::request::RequestId;
use acdb_table::{from_jsonl, to_jsonl, Table};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Cache store rooted at a directory.
///
/// ```text
/// <root>/
/// ├── tables/<dataset>.jsonl
/// └── raw/<dataset>/<slot>/<request>.raw
/// ```
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    root: PathBuf,
}

impl FileCacheStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the table file of a dataset.
    #[must_use]
    pub fn table_path(&self, dataset: &str) -> PathBuf {
        self.root.join("tables").join(format!("{dataset}.jsonl"))
    }

    /// Path of a raw response.
    #[must_use]
    pub fn raw_path(&self, request: &RequestId) -> PathBuf {
        self.raw_dir(&request.dataset)
            .join(&request.slot)
            .join(request.file_name())
    }

    fn raw_dir(&self, dataset: &str) -> PathBuf {
        self.root.join("raw").join(dataset)
    }
}

/// Reads a JSON-lines table file.
///
/// Used for the operator-supplied base snapshots as well as cached tables.
///
/// # Errors
///
/// Returns [`StoreError::Corrupted`] when a line does not decode.
pub fn read_table_file(path: &Path) -> StoreResult<Option<Table>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    from_jsonl(&bytes)
        .map(Some)
        .map_err(|e| StoreError::corrupted(path, e.to_string()))
}

impl CacheStore for FileCacheStore {
    fn load(&self, dataset: &str) -> StoreResult<Option<Table>> {
        read_table_file(&self.table_path(dataset))
    }

    fn save(&self, dataset: &str, table: &Table) -> StoreResult<()> {
        let bytes = to_jsonl(table)?;
        write_atomic(&self.table_path(dataset), &bytes)
    }

    fn remove(&self, dataset: &str) -> StoreResult<bool> {
        match fs::remove_file(self.table_path(dataset)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn load_raw(&self, request: &RequestId) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.raw_path(request)) {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_raw(&self, request: &RequestId, bytes: &[u8]) -> StoreResult<()> {
        write_atomic(&self.raw_path(request), bytes)
    }

    fn clear_raw(&self, dataset: &str) -> StoreResult<usize> {
        let dir = self.raw_dir(dataset);
        if !dir.exists() {
            return Ok(0);
        }
        let removed = count_files(&dir)?;
        fs::remove_dir_all(&dir)?;
        Ok(removed)
    }
}

fn count_files(dir: &Path) -> StoreResult<usize> {
    let mut n = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            n += count_files(&entry.path())?;
        } else {
            n += 1;
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use acdb_table::Row;
    use tempfile::tempdir;

    fn table() -> Table {
        Table::from_rows(vec![
            Row::new().with("id", 1).with("epoch_second", 100),
            Row::new().with("id", 2).with("epoch_second", 105),
        ])
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());

        assert!(store.load("submissions").unwrap().is_none());
        store.save("submissions", &table()).unwrap();
        assert_eq!(store.load("submissions").unwrap(), Some(table()));
        assert!(store.table_path("submissions").exists());
    }

    #[test]
    fn save_is_byte_stable() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());

        store.save("t", &table()).unwrap();
        let first = fs::read(store.table_path("t")).unwrap();
        let reloaded = store.load("t").unwrap().unwrap();
        store.save("t", &reloaded).unwrap();
        assert_eq!(fs::read(store.table_path("t")).unwrap(), first);
    }

    #[test]
    fn corrupt_table_is_reported() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        fs::create_dir_all(dir.path().join("tables")).unwrap();
        fs::write(store.table_path("bad"), b"{\"id\":1}\nnot json\n").unwrap();

        let err = store.load("bad").unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }));
    }

    #[test]
    fn edited_template_misses_the_raw_cache() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        let old = RequestId::new("results", "https://x/{}/results", "abc300");
        let new = RequestId::new("results", "https://x/{}/results/json", "abc300");

        store.save_raw(&old, b"<html></html>").unwrap();
        assert!(store.load_raw(&old).unwrap().is_some());
        assert!(store.load_raw(&new).unwrap().is_none());
    }

    #[test]
    fn raw_entries_are_independent_of_tables() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        let page1 = RequestId::new("contests", "https://x/archive?page={}", "1");
        let page2 = RequestId::new("contests", "https://x/archive?page={}", "2");
        let extra = RequestId::new("contests", "https://x/contests.json", "").in_slot("supplement");

        store.save_raw(&page1, b"<html>1</html>").unwrap();
        store.save_raw(&page2, b"<html>2</html>").unwrap();
        store.save_raw(&extra, b"[]").unwrap();
        assert_eq!(store.load_raw(&page2).unwrap().unwrap(), b"<html>2</html>");
        assert!(store.load("contests").unwrap().is_none());

        assert_eq!(store.clear_raw("contests").unwrap(), 3);
        assert!(store.load_raw(&page1).unwrap().is_none());
        assert_eq!(store.clear_raw("contests").unwrap(), 0);
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        store.save("t", &table()).unwrap();
        assert!(store.remove("t").unwrap());
        assert!(!store.remove("t").unwrap());
    }
}
