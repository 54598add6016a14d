//! Engine fixtures.
//!
//! [`DiskFixture`] runs an engine over file stores in a temporary
//! directory; [`MemoryFixture`] keeps everything in memory and exposes the
//! stores for inspection.

use crate::origin::ScriptedClient;
use crate::pages::json_rows;
use acdb_storage::{MemoryCacheStore, MemoryStateStore};
use acdb_sync_engine::{Engine, EngineConfig, Parsers, Registry};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Fixed wall clock used by the fixtures, in epoch seconds.
pub const FIXTURE_NOW: i64 = 1_700_000_000;

/// Parsers every fixture registers: `json_rows`.
#[must_use]
pub fn test_parsers() -> Parsers {
    Parsers::new().with("json_rows", json_rows)
}

/// Engine configuration rooted at `root` with no politeness delay.
#[must_use]
pub fn test_config(root: &Path) -> EngineConfig {
    EngineConfig::new(root).with_request_delay(Duration::ZERO)
}

/// An engine over file stores in a temporary directory.
pub struct DiskFixture {
    /// The engine.
    pub engine: Engine<ScriptedClient>,
    /// Handle on the engine's origin.
    pub origin: ScriptedClient,
    registry: Registry,
    parsers: Parsers,
    /// Kept alive to prevent cleanup.
    dir: TempDir,
}

impl DiskFixture {
    /// Creates an engine with the [`test_parsers`].
    pub fn new(registry: Registry, origin: ScriptedClient) -> Self {
        Self::with_parsers(registry, test_parsers(), origin)
    }

    /// Creates an engine with explicit parsers.
    pub fn with_parsers(registry: Registry, parsers: Parsers, origin: ScriptedClient) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let engine = Engine::new(test_config(dir.path()), registry.clone(), parsers.clone(), origin.clone())
            .expect("Failed to create engine")
            .with_clock(|| FIXTURE_NOW);
        Self {
            engine,
            origin,
            registry,
            parsers,
            dir,
        }
    }

    /// Root of the cache directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Location of a dataset's table file.
    #[must_use]
    pub fn table_path(&self, dataset: &str) -> PathBuf {
        self.dir.path().join("tables").join(format!("{dataset}.jsonl"))
    }

    /// Location of the state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("state.json")
    }

    /// Replaces the engine with a fresh one over the same directory, as a
    /// new process would see it.
    pub fn restart(&mut self) {
        self.restart_at(FIXTURE_NOW);
    }

    /// Like [`DiskFixture::restart`] with another wall clock.
    pub fn restart_at(&mut self, now: i64) {
        self.restart_with(now, |config| config);
    }

    /// Like [`DiskFixture::restart_at`], adjusting the engine configuration.
    pub fn restart_with(&mut self, now: i64, configure: impl FnOnce(EngineConfig) -> EngineConfig) {
        self.engine = Engine::new(
            configure(test_config(self.dir.path())),
            self.registry.clone(),
            self.parsers.clone(),
            self.origin.clone(),
        )
        .expect("Failed to create engine")
        .with_clock(move || now);
    }
}

/// An engine over shared memory stores.
pub struct MemoryFixture {
    /// The engine.
    pub engine: Engine<ScriptedClient>,
    /// Handle on the engine's origin.
    pub origin: ScriptedClient,
    /// Handle on the engine's cache store.
    pub cache: MemoryCacheStore,
    /// Handle on the engine's state store.
    pub state: MemoryStateStore,
}

impl MemoryFixture {
    /// Creates an engine with the [`test_parsers`].
    pub fn new(registry: Registry, origin: ScriptedClient) -> Self {
        Self::with_parsers(registry, test_parsers(), origin)
    }

    /// Creates an engine with explicit parsers.
    pub fn with_parsers(registry: Registry, parsers: Parsers, origin: ScriptedClient) -> Self {
        let cache = MemoryCacheStore::new();
        let state = MemoryStateStore::new();
        let engine = Engine::with_stores(
            test_config(Path::new("unused")),
            registry,
            parsers,
            origin.clone(),
            Box::new(cache.clone()),
            Box::new(state.clone()),
        )
        .expect("Failed to create engine")
        .with_clock(|| FIXTURE_NOW);
        Self {
            engine,
            origin,
            cache,
            state,
        }
    }
}
