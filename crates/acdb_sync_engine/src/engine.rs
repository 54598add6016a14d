//! The synchronization engine.
//!
//! Per dataset the engine moves through
//! `Unloaded -> Loaded(severity) -> Syncing -> Loaded(Fresh)`.
//! There is no error state: a failed fetch loop persists what it merged and
//! leaves the dataset loaded, ready to resume on the next sync.

use crate::adapter::{Cursor, CursorContext, ParseOutcome, Parser, Parsers};
use crate::config::EngineConfig;
use crate::dependency::{evaluate, Evaluation, Severity};
use crate::error::{SyncError, SyncResult};
use crate::fetch::{Fetcher, HttpClient};
use crate::registry::{BaseSnapshot, DatasetSpec, DerivedMarker, PostProcess, Registry, SourceSpec};
use acdb_storage::{
    read_table_file, CacheStore, FileCacheStore, FileStateStore, Marker, Markers, RequestId,
    StateStore, SyncStates,
};
use acdb_table::{Filter, RowKey, Table, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Marker holding the resume point of the last successful sync.
pub const LAST_CURSOR: &str = "last_cursor";
/// Marker holding the last ordering value of the base snapshot.
pub const BASE_LAST_EPOCH: &str = "base_file_last_epoch";
/// Marker holding the previous value of [`BASE_LAST_EPOCH`].
pub const BASE_LAST_EPOCH_PREVIOUS: &str = "base_file_last_epoch_previous";

/// Lifecycle phase of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetPhase {
    /// Not read from the cache yet.
    Unloaded,
    /// In memory, with the severity found by the last evaluation.
    Loaded(Severity),
    /// A fetch loop is running.
    Syncing,
}

impl DatasetPhase {
    /// Returns true if a fetch loop is running.
    pub fn is_active(&self) -> bool {
        matches!(self, DatasetPhase::Syncing)
    }

    /// Returns true if the dataset needs a sync.
    pub fn is_stale(&self) -> bool {
        matches!(self, DatasetPhase::Loaded(s) if s.is_stale())
    }
}

impl fmt::Display for DatasetPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetPhase::Unloaded => f.write_str("unloaded"),
            DatasetPhase::Loaded(severity) => write!(f, "{severity}"),
            DatasetPhase::Syncing => f.write_str("syncing"),
        }
    }
}

/// Summary of one fetch loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// Dataset synced.
    pub dataset: String,
    /// Severity that triggered the sync.
    pub severity: Severity,
    /// Whether the reset sub-path ran first.
    pub reset: bool,
    /// Requests issued, cache hits included.
    pub requests: usize,
    /// Rows added.
    pub added: usize,
    /// Rows in the merged table, base snapshot included.
    pub total: usize,
    /// Where a later sync resumes.
    pub cursor: Option<Cursor>,
}

/// Snapshot of a dataset for operators.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStatus {
    /// Dataset name.
    pub name: String,
    /// Adapter kind.
    pub kind: &'static str,
    /// Current phase.
    pub phase: DatasetPhase,
    /// Rows in memory, base snapshot included.
    pub rows: usize,
    /// Rows coming from the base snapshot.
    pub base_rows: usize,
    /// Current markers.
    pub markers: Markers,
    /// Dependency evaluation.
    pub evaluation: Evaluation,
}

#[derive(Debug)]
struct LoadedDataset {
    table: Table,
    /// Rows at the front of `table` that come from the base snapshot.
    base_len: usize,
    markers: Markers,
    /// False until a table file exists for the dataset.
    persisted: bool,
    phase: DatasetPhase,
}

impl LoadedDataset {
    /// A dataset that was never persisted is behind whatever its
    /// dependencies say.
    fn severity(&self, evaluation: &Evaluation) -> Severity {
        if self.persisted {
            evaluation.severity
        } else {
            evaluation.severity.max(Severity::Soft)
        }
    }
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Lazily loads, evaluates and synchronizes the datasets of a [`Registry`].
///
/// Every operation that may sync takes `&mut self`, so fetch loops cannot
/// nest. Worklist source tables are obtained before a loop starts.
pub struct Engine<C: HttpClient> {
    config: EngineConfig,
    registry: Registry,
    parsers: Parsers,
    client: C,
    cache: Box<dyn CacheStore>,
    state: Box<dyn StateStore>,
    datasets: HashMap<String, LoadedDataset>,
    clock: Clock,
}

impl<C: HttpClient> Engine<C> {
    /// Creates an engine with file stores under `config.cache_root`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the registry is invalid or names a
    /// parser that is not provided.
    pub fn new(config: EngineConfig, registry: Registry, parsers: Parsers, client: C) -> SyncResult<Self> {
        let cache = FileCacheStore::new(config.cache_root.clone());
        let state = FileStateStore::new(config.state_path.clone());
        Self::with_stores(config, registry, parsers, client, Box::new(cache), Box::new(state))
    }

    /// Creates an engine over explicit stores.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::new`].
    pub fn with_stores(
        config: EngineConfig,
        registry: Registry,
        parsers: Parsers,
        client: C,
        cache: Box<dyn CacheStore>,
        state: Box<dyn StateStore>,
    ) -> SyncResult<Self> {
        registry.validate()?;
        for spec in &registry.datasets {
            let supplements = spec.post_process.iter().filter_map(|p| match p {
                PostProcess::MergeSupplement { parser, .. } => Some(parser.as_str()),
                _ => None,
            });
            for parser in std::iter::once(spec.parser.as_str()).chain(supplements) {
                if !parsers.contains(parser) {
                    return Err(SyncError::config(format!(
                        "{} uses unknown parser {parser}",
                        spec.name
                    )));
                }
            }
        }

        Ok(Self {
            config,
            registry,
            parsers,
            client,
            cache,
            state,
            datasets: HashMap::new(),
            clock: Box::new(|| chrono::Utc::now().timestamp()),
        })
    }

    /// Replaces the wall clock, in epoch seconds.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// The registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current phase of a dataset.
    pub fn phase(&self, name: &str) -> DatasetPhase {
        self.datasets
            .get(name)
            .map_or(DatasetPhase::Unloaded, |d| d.phase)
    }

    /// Current table of a dataset, syncing it first if it is stale.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed load or sync. The partial progress of
    /// a failed sync is kept.
    pub fn table(&mut self, name: &str) -> SyncResult<&Table> {
        self.ensure_loaded(name)?;
        if let DatasetPhase::Loaded(severity) = self.phase(name) {
            if severity.is_stale() {
                self.run_sync(name, severity)?;
            }
        }
        self.loaded(name).map(|d| &d.table)
    }

    /// Rows of a dataset matching every filter.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::table`].
    pub fn filter(&mut self, name: &str, filters: &[Filter]) -> SyncResult<Table> {
        Ok(self.table(name)?.filter(filters))
    }

    /// Evaluates the dependencies of a dataset without syncing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be loaded.
    pub fn evaluate(&mut self, name: &str) -> SyncResult<Evaluation> {
        self.ensure_loaded(name)?;
        let evaluation = self.evaluate_loaded(name)?;
        if let Some(d) = self.datasets.get_mut(name) {
            if !d.phase.is_active() {
                d.phase = DatasetPhase::Loaded(d.severity(&evaluation));
            }
        }
        Ok(evaluation)
    }

    /// Loads a dataset and reports its state without syncing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be loaded.
    pub fn status(&mut self, name: &str) -> SyncResult<DatasetStatus> {
        let evaluation = self.evaluate(name)?;
        let kind = self.spec(name)?.source.kind();
        let d = self.loaded(name)?;
        Ok(DatasetStatus {
            name: name.to_string(),
            kind,
            phase: d.phase,
            rows: d.table.len(),
            base_rows: d.base_len,
            markers: d.markers.clone(),
            evaluation,
        })
    }

    /// Runs the fetch loop now, whatever the dependencies say.
    ///
    /// A hard-stale dataset is reset first.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed load or fetch step.
    pub fn sync(&mut self, name: &str) -> SyncResult<SyncOutcome> {
        let evaluation = self.evaluate(name)?;
        self.run_sync(name, evaluation.severity.max(Severity::Soft))
    }

    /// Removes a dataset's table, raw responses and markers.
    ///
    /// The next access fetches it from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if the stores fail.
    pub fn reset(&mut self, name: &str) -> SyncResult<()> {
        let spec = self.spec(name)?.clone();
        let removed = self.cache.remove(name)?;
        let raw = self.cache.clear_raw(name)?;
        self.state.write(name, &spec.default_markers)?;
        self.datasets.remove(name);
        info!(dataset = %name, table_removed = removed, raw_removed = raw, "reset dataset");
        Ok(())
    }

    fn spec(&self, name: &str) -> SyncResult<&DatasetSpec> {
        self.registry
            .get(name)
            .ok_or_else(|| SyncError::UnknownDataset(name.to_string()))
    }

    fn loaded(&self, name: &str) -> SyncResult<&LoadedDataset> {
        self.datasets
            .get(name)
            .ok_or_else(|| SyncError::UnknownDataset(name.to_string()))
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn ensure_loaded(&mut self, name: &str) -> SyncResult<()> {
        if self.datasets.contains_key(name) {
            return Ok(());
        }
        let spec = self.spec(name)?.clone();
        let mut markers = if self.config.force_reinit {
            info!(dataset = %name, "discarding persisted sync state");
            self.state.reinit(name, &spec.default_markers)?
        } else {
            self.state.read(name, &spec.default_markers)
        };

        let mut table = Table::new();
        let mut base_len = 0;
        if let Some(base) = &spec.base_snapshot {
            table = self.load_base(&spec, base, &mut markers)?;
            base_len = table.len();
        }

        let cached = self.cache.load(name)?;
        let persisted = cached.is_some();
        match cached {
            Some(cached) => {
                info!(dataset = %name, rows = cached.len(), "loaded table");
                table.append(cached);
            }
            None => info!(dataset = %name, "no table yet"),
        }

        self.datasets.insert(
            name.to_string(),
            LoadedDataset {
                table,
                base_len,
                markers,
                persisted,
                phase: DatasetPhase::Loaded(Severity::Fresh),
            },
        );

        let evaluation = self.evaluate_loaded(name)?;
        if let Some(d) = self.datasets.get_mut(name) {
            d.phase = DatasetPhase::Loaded(d.severity(&evaluation));
        }
        Ok(())
    }

    fn load_base(
        &self,
        spec: &DatasetSpec,
        base: &BaseSnapshot,
        markers: &mut Markers,
    ) -> SyncResult<Table> {
        let started = Instant::now();
        let mut table = read_table_file(&base.path)?.ok_or_else(|| SyncError::MissingBaseSnapshot {
            dataset: spec.name.clone(),
            path: base.path.clone(),
        })?;
        table.sort_by_column(&base.ordering);
        info!(
            dataset = %spec.name,
            rows = table.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded base snapshot"
        );

        let last_epoch = table
            .last()
            .and_then(|r| r.get(&base.ordering))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let age_secs = self.now() - last_epoch;
        if age_secs >= base.max_age_secs {
            return Err(SyncError::StaleBaseSnapshot {
                dataset: spec.name.clone(),
                last_epoch,
                age_secs,
            });
        }

        let previous = markers.get(BASE_LAST_EPOCH).cloned().unwrap_or_default();
        if previous.as_i64() != Some(last_epoch) {
            info!(dataset = %spec.name, last_epoch, "detected new base snapshot");
        }
        markers.insert(BASE_LAST_EPOCH_PREVIOUS.to_string(), previous);
        markers.insert(BASE_LAST_EPOCH.to_string(), Marker::Integer(last_epoch));
        Ok(table)
    }

    fn evaluate_loaded(&self, name: &str) -> SyncResult<Evaluation> {
        let spec = self.spec(name)?;
        let d = self.loaded(name)?;

        let mut others = SyncStates::new();
        for dep in &spec.dependencies {
            if others.get(&dep.other_dataset).is_some() {
                continue;
            }
            let markers = if dep.other_dataset == name {
                d.markers.clone()
            } else if let Some(other) = self.datasets.get(&dep.other_dataset) {
                other.markers.clone()
            } else {
                let defaults = self
                    .registry
                    .get(&dep.other_dataset)
                    .map(|s| s.default_markers.clone())
                    .unwrap_or_default();
                if self.config.force_reinit {
                    defaults
                } else {
                    self.state.read(&dep.other_dataset, &defaults)
                }
            };
            others.insert(dep.other_dataset.clone(), markers);
        }

        let cached = d.table.slice_from(d.base_len);
        Ok(evaluate(name, &spec.dependencies, &d.markers, &others, self.now(), &cached))
    }

    fn run_sync(&mut self, name: &str, severity: Severity) -> SyncResult<SyncOutcome> {
        self.ensure_loaded(name)?;
        if self.phase(name).is_active() {
            return Err(SyncError::config(format!("{name} is already syncing")));
        }
        let spec = self.spec(name)?.clone();

        let source = match &spec.source {
            SourceSpec::Worklist(w) => Some(self.table(&w.source_dataset)?.clone()),
            _ => None,
        };

        let Some(mut d) = self.datasets.remove(name) else {
            return Err(SyncError::UnknownDataset(name.to_string()));
        };
        let reset = severity == Severity::Hard;
        if reset {
            d.persisted = false;
            let removed = self.cache.remove(name)?;
            let raw = self.cache.clear_raw(name)?;
            d.table.truncate(d.base_len);
            d.markers = reset_markers(&spec, &d.markers);
            info!(dataset = %name, table_removed = removed, raw_removed = raw, "hard-stale, reset before sync");
        }
        d.phase = DatasetPhase::Syncing;
        info!(dataset = %name, severity = %severity, kind = spec.source.kind(), "sync started");

        let mut run = self.fetch_loop(&spec, &mut d, source.as_ref());
        if run.error.is_none() {
            if let Err(e) = self.post_process(&spec, &mut d, &mut run) {
                run.error = Some(e);
            }
        }

        let persisted = self.cache.save(name, &d.table.slice_from(d.base_len));
        d.persisted |= persisted.is_ok();
        let result = match (persisted, run.error.take()) {
            (Err(e), _) => Err(e.into()),
            (Ok(()), Some(e)) => Err(e),
            (Ok(()), None) => self.commit_markers(&spec, &mut d, &run),
        };

        let outcome = SyncOutcome {
            dataset: name.to_string(),
            severity,
            reset,
            requests: run.requests,
            added: run.added,
            total: d.table.len(),
            cursor: run.cursor,
        };
        d.phase = match &result {
            Ok(()) => DatasetPhase::Loaded(Severity::Fresh),
            // still behind; never re-run the reset on a partial table
            Err(_) => DatasetPhase::Loaded(Severity::Soft),
        };
        self.datasets.insert(name.to_string(), d);

        match result {
            Ok(()) => {
                info!(
                    dataset = %name,
                    requests = outcome.requests,
                    added = outcome.added,
                    total = outcome.total,
                    "sync finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(dataset = %name, added = outcome.added, error = %e, "sync stopped early, partial table kept");
                Err(e)
            }
        }
    }

    fn fetch_loop(&self, spec: &DatasetSpec, d: &mut LoadedDataset, source: Option<&Table>) -> LoopRun {
        let mut run = LoopRun::default();
        let parser = match self.parser(&spec.parser) {
            Ok(p) => p,
            Err(e) => {
                run.error = Some(e);
                return run;
            }
        };
        let fetcher = self.fetcher();
        let dedup = !spec.uniqueness.is_empty();
        let mut seen: HashSet<RowKey> = if dedup {
            d.table.key_set(&spec.uniqueness)
        } else {
            HashSet::new()
        };

        let mut cursor = spec.source.initial_cursor(CursorContext {
            table: &d.table,
            source,
        });
        if cursor.is_none() {
            info!(dataset = %spec.name, "nothing to fetch");
        }

        while let Some(current) = cursor.take() {
            let head = current.head();
            let (request, next) = spec.source.next_request(&spec.name, current, &d.table);
            run.requests += 1;
            run.last = next.clone();

            let fetched = match fetcher.fetch(&request, parser.as_ref(), Some(&spec.source), spec.raw_cache) {
                Ok(f) => f,
                Err(e) => {
                    run.error = Some(e);
                    break;
                }
            };
            run.contacted |= fetched.from_origin;

            let page = match fetched.outcome {
                ParseOutcome::Rows(page) if !page.is_empty() => page,
                ParseOutcome::Rows(_) => {
                    info!(dataset = %spec.name, request = %request, "empty page, stopping");
                    break;
                }
                ParseOutcome::Empty { reason } => {
                    info!(dataset = %spec.name, request = %request, reason = %reason, "nothing usable, stopping");
                    // still owed; the next sync starts here
                    run.last = Some(head);
                    break;
                }
            };

            let fetched_len = page.len();
            let exhausted = spec.source.is_exhausted(&page, next.as_ref());
            let addition = if dedup {
                page.retain_unseen(&spec.uniqueness, &mut seen)
            } else {
                page
            };
            let added = addition.len();
            d.table.append(addition);
            run.added += added;
            info!(dataset = %spec.name, request = %request, fetched = fetched_len, added, "merged page");

            if added == 0 {
                break;
            }
            if added < fetched_len && spec.break_on_duplication {
                info!(dataset = %spec.name, "page overlaps known keys, stopping");
                break;
            }
            if exhausted {
                break;
            }
            cursor = next;
        }

        run.cursor = spec.source.resume_cursor(run.last.take(), &d.table);
        run
    }

    fn post_process(&self, spec: &DatasetSpec, d: &mut LoadedDataset, run: &mut LoopRun) -> SyncResult<()> {
        for hook in &spec.post_process {
            match hook {
                PostProcess::RecordRecentKeys { column, marker } => {
                    let recent = d.table.slice_from(d.base_len).distinct(column);
                    run.markers.insert(marker.clone(), Marker::List(recent));
                }
                PostProcess::MergeSupplement { url, parser } => {
                    let parser = self.parser(parser)?;
                    let request = RequestId::new(&spec.name, url, "").in_slot("supplement");
                    run.requests += 1;
                    let fetched = self.fetcher().fetch(&request, parser.as_ref(), None, spec.raw_cache)?;
                    run.contacted |= fetched.from_origin;
                    if let ParseOutcome::Rows(rows) = fetched.outcome {
                        let addition = if spec.uniqueness.is_empty() {
                            rows
                        } else {
                            let mut seen = d.table.key_set(&spec.uniqueness);
                            rows.retain_unseen(&spec.uniqueness, &mut seen)
                        };
                        info!(dataset = %spec.name, added = addition.len(), "merged supplement");
                        run.added += addition.len();
                        d.table.append(addition);
                    }
                }
                PostProcess::SortBy { column } => {
                    let mut tail = d.table.split_off(d.base_len);
                    tail.sort_by_column(column);
                    d.table.append(tail);
                }
            }
        }
        Ok(())
    }

    fn commit_markers(&self, spec: &DatasetSpec, d: &mut LoadedDataset, run: &LoopRun) -> SyncResult<()> {
        let now = self.now();
        let mut markers = d.markers.clone();
        markers.extend(run.markers.iter().map(|(k, v)| (k.clone(), v.clone())));
        markers.insert(
            LAST_CURSOR.to_string(),
            run.cursor.as_ref().map_or(Marker::Null, Cursor::to_marker),
        );
        if spec.base_snapshot.is_some() {
            // the persisted tail now sits on the loaded snapshot
            let current = markers.get(BASE_LAST_EPOCH).cloned().unwrap_or_default();
            markers.insert(BASE_LAST_EPOCH_PREVIOUS.to_string(), current);
        }
        if let (Some(marker), true) = (&spec.fetch_time_marker, run.contacted) {
            markers.insert(marker.clone(), Marker::Integer(now));
        }
        for rule in &spec.derived_markers {
            let (marker, value) = derive(rule, &d.table, now);
            markers.insert(marker, value);
        }

        self.state.write(&spec.name, &markers)?;
        d.markers = markers;
        Ok(())
    }

    fn parser(&self, name: &str) -> SyncResult<Arc<dyn Parser>> {
        self.parsers
            .get(name)
            .ok_or_else(|| SyncError::config(format!("unknown parser {name}")))
    }

    fn fetcher(&self) -> Fetcher<'_, C> {
        Fetcher {
            client: &self.client,
            cache: self.cache.as_ref(),
            headers: &self.config.headers,
            delay: self.config.request_delay,
        }
    }
}

/// Bookkeeping of one fetch loop.
#[derive(Debug, Default)]
struct LoopRun {
    requests: usize,
    added: usize,
    /// The origin answered with usable rows at least once.
    contacted: bool,
    last: Option<Cursor>,
    cursor: Option<Cursor>,
    markers: Markers,
    error: Option<SyncError>,
}

/// Registry defaults, keeping what describes the loaded base snapshot.
fn reset_markers(spec: &DatasetSpec, current: &Markers) -> Markers {
    let mut markers = spec.default_markers.clone();
    if spec.base_snapshot.is_some() {
        for key in [BASE_LAST_EPOCH, BASE_LAST_EPOCH_PREVIOUS] {
            if let Some(value) = current.get(key) {
                markers.insert(key.to_string(), value.clone());
            }
        }
    }
    markers
}

fn derive(rule: &DerivedMarker, table: &Table, now: i64) -> (String, Marker) {
    match rule {
        DerivedMarker::RecentKeys {
            marker,
            key_column,
            time_column,
            window_secs,
            filters,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let since = (now - window_secs) as f64;
            let recent: Table = table
                .filter(filters)
                .into_iter()
                .filter(|row| {
                    row.get(time_column)
                        .and_then(Value::as_f64)
                        .is_some_and(|t| t > since)
                })
                .collect();
            (marker.clone(), Marker::List(recent.distinct(key_column)))
        }
    }
}
