//! # acdb storage
//!
//! Persistence for the acdb synchronization engine.
//!
//! Two independent stores live here:
//!
//! - a [`CacheStore`] holding dataset tables (one JSON-lines file each) and
//!   raw remote responses keyed by [`RequestId`]
//! - a [`StateStore`] holding per-dataset [`Markers`] in one flat file
//!
//! Every file is replaced atomically (temp file, fsync, rename, directory
//! fsync). The stores do not interpret tables or markers.
//!
//! ## Example
//!
//! ```rust
//! use acdb_storage::{CacheStore, MemoryCacheStore, RequestId};
//!
//! let store = MemoryCacheStore::new();
//! let request = RequestId::new("contests", "https://example.com/archive?page={}", "1");
//! store.save_raw(&request, b"<html></html>").unwrap();
//! assert!(store.load_raw(&request).unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod atomic;
mod cache;
mod error;
mod file;
mod memory;
mod request;
mod state;

pub use cache::CacheStore;
pub use error::{StoreError, StoreResult};
pub use file::{read_table_file, FileCacheStore};
pub use memory::MemoryCacheStore;
pub use request::{RequestId, PLACEHOLDER};
pub use state::{FileStateStore, Marker, Markers, MemoryStateStore, StateStore, SyncStates};
