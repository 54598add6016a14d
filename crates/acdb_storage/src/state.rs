//! Per-dataset "last synced" markers.
//!
//! All datasets share one JSON file:
//!
//! ```json
//! {"contests": {"recently_rated_contest_ids": ["abc300"]},
//!  "submissions": {"last_cursor": 1700000000}}
//! ```
//!
//! The file is rewritten whole after every successful sync. A missing or
//! unreadable file is never fatal; readers fall back to declared defaults.

use crate::atomic::write_atomic;
use crate::error::{StoreError, StoreResult};
use acdb_table::Value;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// A persisted marker value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Marker {
    /// No value yet.
    Null,
    /// Integer marker, typically an epoch second.
    Integer(i64),
    /// Float marker.
    Float(f64),
    /// Text marker.
    Text(String),
    /// Set-like marker, typically recently seen keys.
    List(Vec<Value>),
}

impl Marker {
    /// Returns true for [`Marker::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Marker::Null)
    }

    /// Numeric view of the marker.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Marker::Integer(i) => Some(*i as f64),
            Marker::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of the marker.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Marker::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// List view of the marker.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Marker::List(v) => Some(v),
            _ => None,
        }
    }

    /// Converts a table cell into a marker.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Marker::Null,
            Value::Bool(b) => Marker::Integer(i64::from(*b)),
            Value::Integer(i) => Marker::Integer(*i),
            Value::Float(f) => Marker::Float(*f),
            Value::Text(s) => Marker::Text(s.clone()),
        }
    }

    /// Converts a scalar marker into a table cell. Lists have no cell form.
    #[must_use]
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Marker::Null => Some(Value::Null),
            Marker::Integer(i) => Some(Value::Integer(*i)),
            Marker::Float(f) => Some(Value::Float(*f)),
            Marker::Text(s) => Some(Value::Text(s.clone())),
            Marker::List(_) => None,
        }
    }
}

impl Default for Marker {
    fn default() -> Self {
        Marker::Null
    }
}

/// Condensed form for logs: lists print as `list#<len>`.
impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Null => f.write_str("null"),
            Marker::Integer(i) => write!(f, "{i}"),
            Marker::Float(x) => write!(f, "{x}"),
            Marker::Text(s) => f.write_str(s),
            Marker::List(v) => write!(f, "list#{}", v.len()),
        }
    }
}

impl From<i64> for Marker {
    fn from(v: i64) -> Self {
        Marker::Integer(v)
    }
}

impl From<f64> for Marker {
    fn from(v: f64) -> Self {
        Marker::Float(v)
    }
}

impl From<&str> for Marker {
    fn from(v: &str) -> Self {
        Marker::Text(v.to_string())
    }
}

impl From<String> for Marker {
    fn from(v: String) -> Self {
        Marker::Text(v)
    }
}

impl From<Vec<Value>> for Marker {
    fn from(v: Vec<Value>) -> Self {
        Marker::List(v)
    }
}

/// Markers of one dataset.
pub type Markers = BTreeMap<String, Marker>;

/// Markers of every dataset, as persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncStates(BTreeMap<String, Markers>);

impl SyncStates {
    /// Creates an empty state set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Markers of a dataset.
    #[must_use]
    pub fn get(&self, dataset: &str) -> Option<&Markers> {
        self.0.get(dataset)
    }

    /// One marker of a dataset.
    #[must_use]
    pub fn marker(&self, dataset: &str, name: &str) -> Option<&Marker> {
        self.0.get(dataset).and_then(|m| m.get(name))
    }

    /// Replaces the markers of a dataset.
    pub fn insert(&mut self, dataset: impl Into<String>, markers: Markers) {
        self.0.insert(dataset.into(), markers);
    }

    /// Dataset names with persisted markers.
    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Home of the sync state.
pub trait StateStore: Send + Sync {
    /// Loads every dataset's markers.
    ///
    /// Never fails: an absent or corrupt file yields an empty set, the
    /// latter with a warning.
    fn load_all(&self) -> SyncStates;

    /// Rewrites the whole state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be encoded or written.
    fn save_all(&self, states: &SyncStates) -> StoreResult<()>;

    /// Persisted markers of `dataset` merged over `defaults`.
    fn read(&self, dataset: &str, defaults: &Markers) -> Markers {
        let mut markers = defaults.clone();
        if let Some(saved) = self.load_all().get(dataset) {
            markers.extend(saved.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        markers
    }

    /// Discards the persisted markers of `dataset` and stores `defaults`
    /// in their place.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn reinit(&self, dataset: &str, defaults: &Markers) -> StoreResult<Markers> {
        self.write(dataset, defaults)?;
        Ok(defaults.clone())
    }

    /// Replaces the markers of `dataset`, keeping every other dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn write(&self, dataset: &str, markers: &Markers) -> StoreResult<()> {
        let mut all = self.load_all();
        all.insert(dataset, markers.clone());
        self.save_all(&all)
    }
}

/// State store backed by one JSON file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Creates a store writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load_all(&self) -> SyncStates {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return SyncStates::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "sync state unreadable, using defaults");
                return SyncStates::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(states) => states,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "sync state corrupt, using defaults");
                SyncStates::new()
            }
        }
    }

    fn save_all(&self, states: &SyncStates) -> StoreResult<()> {
        let mut bytes = serde_json::to_vec_pretty(states)
            .map_err(|e| StoreError::StateEncoding(e.to_string()))?;
        bytes.push(b'\n');
        write_atomic(&self.path, &bytes)
    }
}

/// State store kept in memory. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    states: Arc<RwLock<SyncStates>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing state.
    #[must_use]
    pub fn with_states(states: SyncStates) -> Self {
        Self {
            states: Arc::new(RwLock::new(states)),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn load_all(&self) -> SyncStates {
        self.states.read().clone()
    }

    fn save_all(&self, states: &SyncStates) -> StoreResult<()> {
        *self.states.write() = states.clone();
        Ok(())
    }
}
