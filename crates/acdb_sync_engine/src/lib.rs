//! # acdb sync engine
//!
//! Dependency-driven incremental synchronization of named tabular datasets
//! against one remote origin.
//!
//! This crate provides:
//! - A declarative, serde-loadable [`Registry`] of datasets
//! - Four source adapters (time series, paginated, worklist, single shot)
//! - A dependency checker grading datasets fresh, soft-stale or hard-stale
//! - A cache-or-network fetch step with a politeness delay
//! - The [`Engine`] tying it together
//!
//! ## Architecture
//!
//! A consumer asks the engine for a dataset. The engine loads it from the
//! cache store, evaluates its dependencies and, when stale, runs the fetch
//! loop of its adapter until exhaustion. New rows are de-duplicated against
//! everything merged so far, the table is persisted whole, and only then is
//! the sync state updated.
//!
//! ## Key Invariants
//!
//! - Evaluating dependencies never modifies a dataset
//! - Sync state is written only after the table was persisted
//! - A failed fetch loop keeps its partial table and leaves state untouched
//! - Persisted rows are only ever dropped by a hard reset
//! - The engine is single-threaded and not reentrant

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod dependency;
mod engine;
mod error;
mod fetch;
mod registry;

pub use adapter::{Cursor, CursorContext, ParseError, ParseOutcome, Parser, Parsers};
pub use config::EngineConfig;
pub use dependency::{evaluate, Evaluation, Failure, Severity};
pub use engine::{
    DatasetPhase, DatasetStatus, Engine, SyncOutcome, BASE_LAST_EPOCH, BASE_LAST_EPOCH_PREVIOUS,
    LAST_CURSOR,
};
pub use error::{SyncError, SyncResult};
pub use fetch::{HttpClient, HttpResponse, ReqwestClient};
pub use registry::{
    BaseSnapshot, CompareOp, DatasetSpec, Dependency, DependencyKind, DerivedMarker,
    PaginatedConfig, PostProcess, Registry, SelfMarker, SingleShotConfig, SourceSpec,
    TimeSeriesConfig, WorklistConfig, DEFAULT_BASE_MAX_AGE_SECS,
};
