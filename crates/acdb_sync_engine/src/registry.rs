//! Declarative dataset registry.
//!
//! Every dataset is one [`DatasetSpec`]; the way it is fetched is one
//! [`SourceSpec`] variant carrying its own typed configuration. Registries
//! are built in code or loaded from JSON:
//!
//! ```json
//! {"datasets": [{
//!   "name": "problem_models",
//!   "parser": "problem_models",
//!   "source": {"kind": "single_shot", "url": "https://example.com/models.json"},
//!   "uniqueness": ["problem_id"]
//! }]}
//! ```

use crate::error::{SyncError, SyncResult};
use acdb_storage::{Marker, Markers, PLACEHOLDER};
use acdb_table::{Filter, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Default maximum age of a base snapshot: ten days.
pub const DEFAULT_BASE_MAX_AGE_SECS: i64 = 864_000;

/// Set of declared datasets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    /// Declared datasets.
    pub datasets: Vec<DatasetSpec>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dataset.
    #[must_use]
    pub fn with(mut self, spec: DatasetSpec) -> Self {
        self.datasets.push(spec);
        self
    }

    /// Parses a registry from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the text is not a valid registry.
    pub fn from_json_str(text: &str) -> SyncResult<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::config(format!("invalid registry: {e}")))
    }

    /// Loads a registry from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> SyncResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| SyncError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Looks up a dataset.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DatasetSpec> {
        self.datasets.iter().find(|d| d.name == name)
    }

    /// Looks up a dataset for modification.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut DatasetSpec> {
        self.datasets.iter_mut().find(|d| d.name == name)
    }

    /// Dataset names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(|d| d.name.as_str())
    }

    /// Checks the registry for configuration errors.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] on duplicate names, missing templates,
    /// unknown dependency or worklist targets, and worklist cycles.
    pub fn validate(&self) -> SyncResult<()> {
        let mut names = HashSet::new();
        for spec in &self.datasets {
            if spec.name.is_empty() {
                return Err(SyncError::config("dataset with empty name"));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(SyncError::config(format!("duplicate dataset {}", spec.name)));
            }
        }

        for spec in &self.datasets {
            spec.source.validate(&spec.name)?;
            for dep in &spec.dependencies {
                if !names.contains(dep.other_dataset.as_str()) {
                    return Err(SyncError::config(format!(
                        "{} depends on unknown dataset {}",
                        spec.name, dep.other_dataset
                    )));
                }
            }
            if let SourceSpec::Worklist(w) = &spec.source {
                if !names.contains(w.source_dataset.as_str()) {
                    return Err(SyncError::config(format!(
                        "{} takes its worklist from unknown dataset {}",
                        spec.name, w.source_dataset
                    )));
                }
            }
            for hook in &spec.post_process {
                if let PostProcess::MergeSupplement { url, .. } = hook {
                    if url.is_empty() {
                        return Err(SyncError::config(format!(
                            "{} declares a supplement without url",
                            spec.name
                        )));
                    }
                }
            }
        }

        self.check_worklist_cycles()
    }

    fn check_worklist_cycles(&self) -> SyncResult<()> {
        let edges: HashMap<&str, &str> = self
            .datasets
            .iter()
            .filter_map(|d| match &d.source {
                SourceSpec::Worklist(w) => Some((d.name.as_str(), w.source_dataset.as_str())),
                _ => None,
            })
            .collect();

        for start in edges.keys() {
            let mut seen = HashSet::new();
            let mut current = *start;
            while let Some(next) = edges.get(current) {
                if !seen.insert(current) || *next == *start {
                    return Err(SyncError::config(format!("worklist cycle through {start}")));
                }
                current = next;
            }
        }
        Ok(())
    }
}

/// One declared dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Dataset name; also the table file stem.
    pub name: String,
    /// Name of the parser turning raw responses into rows.
    pub parser: String,
    /// How the dataset is fetched.
    pub source: SourceSpec,
    /// Staleness constraints.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Columns identifying a row; empty disables de-duplication.
    #[serde(default)]
    pub uniqueness: Vec<String>,
    /// Stop as soon as a page contains a known key.
    #[serde(default)]
    pub break_on_duplication: bool,
    /// Keep raw responses for replay.
    #[serde(default = "default_true")]
    pub raw_cache: bool,
    /// Steps run after the fetch loop.
    #[serde(default)]
    pub post_process: Vec<PostProcess>,
    /// Markers computed from the merged table after saving.
    #[serde(default)]
    pub derived_markers: Vec<DerivedMarker>,
    /// Marker values used when nothing is persisted.
    #[serde(default)]
    pub default_markers: Markers,
    /// Operator-supplied bulk table loaded before the cached tail.
    #[serde(default)]
    pub base_snapshot: Option<BaseSnapshot>,
    /// Marker receiving the time of the last fetch that returned rows.
    #[serde(default)]
    pub fetch_time_marker: Option<String>,
}

fn default_true() -> bool {
    true
}

impl DatasetSpec {
    /// Creates a dataset with no dependencies and no de-duplication.
    pub fn new(name: impl Into<String>, parser: impl Into<String>, source: SourceSpec) -> Self {
        Self {
            name: name.into(),
            parser: parser.into(),
            source,
            dependencies: Vec::new(),
            uniqueness: Vec::new(),
            break_on_duplication: false,
            raw_cache: true,
            post_process: Vec::new(),
            derived_markers: Vec::new(),
            default_markers: Markers::new(),
            base_snapshot: None,
            fetch_time_marker: None,
        }
    }

    /// Adds a staleness constraint.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Sets the uniqueness key.
    #[must_use]
    pub fn with_uniqueness<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.uniqueness = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Enables shallow fetching.
    #[must_use]
    pub fn break_on_duplication(mut self) -> Self {
        self.break_on_duplication = true;
        self
    }

    /// Disables the raw response cache.
    #[must_use]
    pub fn without_raw_cache(mut self) -> Self {
        self.raw_cache = false;
        self
    }

    /// Adds a post-processing step.
    #[must_use]
    pub fn with_post_process(mut self, hook: PostProcess) -> Self {
        self.post_process.push(hook);
        self
    }

    /// Adds a derived marker rule.
    #[must_use]
    pub fn with_derived_marker(mut self, rule: DerivedMarker) -> Self {
        self.derived_markers.push(rule);
        self
    }

    /// Declares a marker and its default value.
    #[must_use]
    pub fn with_default_marker(mut self, name: impl Into<String>, value: impl Into<Marker>) -> Self {
        self.default_markers.insert(name.into(), value.into());
        self
    }

    /// Declares a base snapshot.
    #[must_use]
    pub fn with_base_snapshot(mut self, base: BaseSnapshot) -> Self {
        self.base_snapshot = Some(base);
        self
    }

    /// Records the time of each fetch that returned rows in `marker`.
    #[must_use]
    pub fn with_fetch_time_marker(mut self, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        self.default_markers.entry(marker.clone()).or_insert(Marker::Null);
        self.fetch_time_marker = Some(marker);
        self
    }
}

/// How a dataset is fetched. One variant per adapter kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Append-only stream resumed from the last ordering value.
    TimeSeries(TimeSeriesConfig),
    /// Numbered listing pages.
    Paginated(PaginatedConfig),
    /// One request per key taken from another dataset.
    Worklist(WorklistConfig),
    /// One request, once.
    SingleShot(SingleShotConfig),
}

impl SourceSpec {
    /// URL template of the main request.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            SourceSpec::TimeSeries(c) => &c.url,
            SourceSpec::Paginated(c) => &c.url,
            SourceSpec::Worklist(c) => &c.url,
            SourceSpec::SingleShot(c) => &c.url,
        }
    }

    /// Adapter kind, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SourceSpec::TimeSeries(_) => "time_series",
            SourceSpec::Paginated(_) => "paginated",
            SourceSpec::Worklist(_) => "worklist",
            SourceSpec::SingleShot(_) => "single_shot",
        }
    }

    fn validate(&self, dataset: &str) -> SyncResult<()> {
        let url = self.url();
        if url.is_empty() {
            return Err(SyncError::config(format!("{dataset} has no url template")));
        }
        let needs_placeholder = !matches!(self, SourceSpec::SingleShot(_));
        if needs_placeholder && !url.contains(PLACEHOLDER) {
            return Err(SyncError::config(format!(
                "{dataset} url template {url} lacks a {PLACEHOLDER} placeholder"
            )));
        }
        match self {
            SourceSpec::TimeSeries(c) if c.page_size == Some(0) => {
                Err(SyncError::config(format!("{dataset} has a zero page size")))
            }
            SourceSpec::Paginated(c) if c.max_pages == Some(0) => {
                Err(SyncError::config(format!("{dataset} allows zero pages")))
            }
            _ => Ok(()),
        }
    }
}

/// Append-only stream configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesConfig {
    /// URL template; `{}` receives the resume value.
    pub url: String,
    /// Monotonic ordering column.
    pub ordering: String,
    /// Resume value used when the table is empty.
    #[serde(default = "default_origin")]
    pub origin: Value,
    /// A page shorter than this ends the loop.
    #[serde(default)]
    pub page_size: Option<usize>,
}

fn default_origin() -> Value {
    Value::Integer(0)
}

impl TimeSeriesConfig {
    /// Creates a stream configuration starting at zero.
    pub fn new(url: impl Into<String>, ordering: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ordering: ordering.into(),
            origin: default_origin(),
            page_size: None,
        }
    }

    /// Sets the resume value for an empty table.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<Value>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the full page size.
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }
}

/// Numbered listing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedConfig {
    /// URL template; `{}` receives the page number.
    pub url: String,
    /// Number of the first page.
    #[serde(default = "default_first_page")]
    pub first_page: u64,
    /// Upper bound on pages per sync.
    #[serde(default)]
    pub max_pages: Option<u64>,
}

fn default_first_page() -> u64 {
    1
}

impl PaginatedConfig {
    /// Creates a listing configuration starting at page 1.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            first_page: default_first_page(),
            max_pages: None,
        }
    }

    /// Sets the first page number.
    #[must_use]
    pub fn with_first_page(mut self, page: u64) -> Self {
        self.first_page = page;
        self
    }

    /// Caps the number of pages per sync.
    #[must_use]
    pub fn with_max_pages(mut self, pages: u64) -> Self {
        self.max_pages = Some(pages);
        self
    }
}

/// Per-key worklist configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorklistConfig {
    /// URL template; `{}` receives the key.
    pub url: String,
    /// Dataset the keys come from.
    pub source_dataset: String,
    /// Key column, in both the source and this dataset.
    pub key_column: String,
    /// Source rows must match every filter.
    #[serde(default)]
    pub predicate: Vec<Filter>,
    /// Source column sorted descending to process recent keys first.
    #[serde(default)]
    pub order_by: Option<String>,
}

impl WorklistConfig {
    /// Creates a worklist over every key of `source_dataset`.
    pub fn new(
        url: impl Into<String>,
        source_dataset: impl Into<String>,
        key_column: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            source_dataset: source_dataset.into(),
            key_column: key_column.into(),
            predicate: Vec::new(),
            order_by: None,
        }
    }

    /// Adds a filter on source rows.
    #[must_use]
    pub fn with_predicate(mut self, filter: Filter) -> Self {
        self.predicate.push(filter);
        self
    }

    /// Processes keys by `column`, most recent first.
    #[must_use]
    pub fn most_recent_first(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }
}

/// Single request configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleShotConfig {
    /// URL of the snapshot.
    pub url: String,
}

impl SingleShotConfig {
    /// Creates a single request configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Left-hand side of a dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfMarker {
    /// A persisted marker of this dataset.
    Marker(String),
    /// Current time in epoch seconds.
    Now,
    /// Distinct values of a column of the cached table.
    Virtual {
        /// Column to read.
        column: String,
    },
}

/// Comparison operator of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// `self < other`.
    Lt,
    /// `self == other`.
    Eq,
    /// `set(self) ⊇ set(other)`.
    SetGe,
}

/// How much a failed dependency invalidates the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Fetch the missing tail.
    #[default]
    Soft,
    /// Drop the table and raw cache, then fetch from scratch.
    Hard,
}

/// One staleness constraint: `self (+ gap) op other_dataset.other_marker`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Left-hand side.
    #[serde(rename = "self")]
    pub self_marker: SelfMarker,
    /// Operator.
    pub op: CompareOp,
    /// Dataset holding the right-hand marker.
    pub other_dataset: String,
    /// Right-hand marker.
    pub other_marker: String,
    /// Offset added to a numeric left-hand side.
    #[serde(default)]
    pub gap: Option<i64>,
    /// Severity of a failure.
    #[serde(default)]
    pub kind: DependencyKind,
}

impl Dependency {
    /// Creates a soft constraint.
    pub fn new(
        self_marker: SelfMarker,
        op: CompareOp,
        other_dataset: impl Into<String>,
        other_marker: impl Into<String>,
    ) -> Self {
        Self {
            self_marker,
            op,
            other_dataset: other_dataset.into(),
            other_marker: other_marker.into(),
            gap: None,
            kind: DependencyKind::Soft,
        }
    }

    /// Adds `gap` to the left-hand side before comparing.
    #[must_use]
    pub fn with_gap(mut self, gap: i64) -> Self {
        self.gap = Some(gap);
        self
    }

    /// Marks the constraint hard.
    #[must_use]
    pub fn hard(mut self) -> Self {
        self.kind = DependencyKind::Hard;
        self
    }
}

/// Step run after the fetch loop exits normally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hook", rename_all = "snake_case")]
pub enum PostProcess {
    /// Stores the distinct values of `column` over the rows beyond the base
    /// snapshot.
    RecordRecentKeys {
        /// Column to read.
        column: String,
        /// Marker receiving the list.
        marker: String,
    },
    /// Fetches one extra listing and merges it with de-duplication.
    MergeSupplement {
        /// URL of the listing.
        url: String,
        /// Parser for the listing.
        parser: String,
    },
    /// Sorts the fetched rows by a column.
    SortBy {
        /// Sort column.
        column: String,
    },
}

/// Marker computed from the merged table after saving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DerivedMarker {
    /// Keys of rows matching `filters` whose `time_column` lies within the
    /// trailing `window_secs` of now.
    RecentKeys {
        /// Marker receiving the list.
        marker: String,
        /// Column whose values are stored.
        key_column: String,
        /// Epoch-second column compared to the window.
        time_column: String,
        /// Window length.
        window_secs: i64,
        /// Extra row filters.
        #[serde(default)]
        filters: Vec<Filter>,
    },
}

/// Operator-supplied bulk table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSnapshot {
    /// JSON-lines file.
    pub path: PathBuf,
    /// Epoch-second ordering column.
    pub ordering: String,
    /// Maximum accepted age of the last row.
    #[serde(default = "default_max_age")]
    pub max_age_secs: i64,
}

fn default_max_age() -> i64 {
    DEFAULT_BASE_MAX_AGE_SECS
}

impl BaseSnapshot {
    /// Declares a snapshot with the default ten-day freshness limit.
    pub fn new(path: impl Into<PathBuf>, ordering: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ordering: ordering.into(),
            max_age_secs: DEFAULT_BASE_MAX_AGE_SECS,
        }
    }
}
