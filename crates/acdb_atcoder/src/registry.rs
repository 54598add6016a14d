//! The default AtCoder datasets.

use crate::contests::{parse_archive, parse_contests_json};
use crate::problem_models::parse_problem_models;
use crate::results::parse_results;
use crate::submissions::parse_submissions;
use acdb_sync_engine::{
    BaseSnapshot, CompareOp, DatasetSpec, Dependency, DerivedMarker, PaginatedConfig, Parsers,
    PostProcess, Registry, SelfMarker, SingleShotConfig, SourceSpec, TimeSeriesConfig,
    WorklistConfig, BASE_LAST_EPOCH, BASE_LAST_EPOCH_PREVIOUS,
};
use acdb_table::{Filter, Value};
use std::path::Path;

/// Submission log dataset.
pub const SUBMISSIONS: &str = "submissions";
/// Contest listing dataset.
pub const CONTESTS: &str = "contests";
/// Contest results dataset.
pub const RESULTS: &str = "results";
/// Problem difficulty dataset.
pub const PROBLEM_MODELS: &str = "problem_models";

/// Submission log, from an epoch second on.
pub const SUBMISSIONS_URL: &str = "https://kenkoooo.com/atcoder/atcoder-api/v3/from/{}";
/// Contest archive, by page.
pub const CONTESTS_ARCHIVE_URL: &str = "https://atcoder.jp/contests/archive?page={}";
/// Supplemental contest listing.
pub const CONTESTS_JSON_URL: &str = "https://kenkoooo.com/atcoder/resources/contests.json";
/// Results of one contest.
pub const RESULTS_URL: &str = "https://atcoder.jp/contests/{}/results/json";
/// Problem difficulty models.
pub const PROBLEM_MODELS_URL: &str = "https://kenkoooo.com/atcoder/resources/problem-models.json";

/// Marker holding when the origin last answered.
pub const FETCH_EPOCH_SECOND: &str = "fetch_epoch_second";
/// Contests seen in the submissions fetched by the last sync.
pub const RECENTLY_CONTEST_IDS: &str = "recently_contest_ids";
/// Rated contests that ended within the last 30 days.
pub const RECENTLY_RATED_CONTEST_IDS: &str = "recently_rated_contest_ids";
/// Rated algorithm contests that ended within the last 30 days.
pub const RECENTLY_RATED_ALGO_CONTEST_IDS: &str = "recently_rated_algo_contest_ids";

const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;
const SUBMISSIONS_PAGE_SIZE: usize = 500;

/// Parsers referenced by [`default_registry`].
#[must_use]
pub fn parsers() -> Parsers {
    Parsers::new()
        .with("submissions", parse_submissions)
        .with("contests_archive", parse_archive)
        .with("contests_json", parse_contests_json)
        .with("results", parse_results)
        .with("problem_models", parse_problem_models)
}

fn fetched_within(dataset: &str, secs: i64) -> Dependency {
    Dependency::new(SelfMarker::Now, CompareOp::Lt, dataset, FETCH_EPOCH_SECOND).with_gap(-secs)
}

fn recently_rated(marker: &str, mut filters: Vec<Filter>) -> DerivedMarker {
    filters.insert(0, Filter::equals("rated", 1));
    DerivedMarker::RecentKeys {
        marker: marker.to_string(),
        key_column: "contest_id".into(),
        time_column: "end_epoch_second".into(),
        window_secs: 30 * DAY,
        filters,
    }
}

fn submissions() -> DatasetSpec {
    DatasetSpec::new(
        SUBMISSIONS,
        "submissions",
        SourceSpec::TimeSeries(
            TimeSeriesConfig::new(SUBMISSIONS_URL, "epoch_second").with_page_size(SUBMISSIONS_PAGE_SIZE),
        ),
    )
    .with_uniqueness(["id"])
    .without_raw_cache()
    .with_fetch_time_marker(FETCH_EPOCH_SECOND)
    .with_default_marker(RECENTLY_CONTEST_IDS, Vec::<Value>::new())
    .with_post_process(PostProcess::RecordRecentKeys {
        column: "contest_id".into(),
        marker: RECENTLY_CONTEST_IDS.into(),
    })
    .with_dependency(fetched_within(SUBMISSIONS, HOUR))
    .with_dependency(Dependency::new(
        SelfMarker::Marker(RECENTLY_CONTEST_IDS.into()),
        CompareOp::SetGe,
        CONTESTS,
        RECENTLY_RATED_CONTEST_IDS,
    ))
}

fn contests() -> DatasetSpec {
    DatasetSpec::new(
        CONTESTS,
        "contests_archive",
        SourceSpec::Paginated(PaginatedConfig::new(CONTESTS_ARCHIVE_URL)),
    )
    .with_uniqueness(["contest_id"])
    .break_on_duplication()
    .without_raw_cache()
    .with_fetch_time_marker(FETCH_EPOCH_SECOND)
    .with_default_marker(RECENTLY_RATED_CONTEST_IDS, Vec::<Value>::new())
    .with_default_marker(RECENTLY_RATED_ALGO_CONTEST_IDS, Vec::<Value>::new())
    .with_post_process(PostProcess::MergeSupplement {
        url: CONTESTS_JSON_URL.into(),
        parser: "contests_json".into(),
    })
    .with_derived_marker(recently_rated(RECENTLY_RATED_CONTEST_IDS, Vec::new()))
    .with_derived_marker(recently_rated(
        RECENTLY_RATED_ALGO_CONTEST_IDS,
        vec![Filter::equals("type_", "Algorithm")],
    ))
    .with_dependency(fetched_within(CONTESTS, DAY))
}

fn results() -> DatasetSpec {
    DatasetSpec::new(
        RESULTS,
        "results",
        SourceSpec::Worklist(
            WorklistConfig::new(RESULTS_URL, CONTESTS, "contest_id")
                .with_predicate(Filter::equals("rated", 1))
                .most_recent_first("start_epoch_second"),
        ),
    )
    .with_uniqueness(["contest_id", "user_id"])
    .with_post_process(PostProcess::SortBy {
        column: "end_epoch_second".into(),
    })
    .with_dependency(Dependency::new(
        SelfMarker::Virtual {
            column: "contest_id".into(),
        },
        CompareOp::SetGe,
        CONTESTS,
        RECENTLY_RATED_CONTEST_IDS,
    ))
}

fn problem_models() -> DatasetSpec {
    DatasetSpec::new(
        PROBLEM_MODELS,
        "problem_models",
        SourceSpec::SingleShot(SingleShotConfig::new(PROBLEM_MODELS_URL)),
    )
    .with_uniqueness(["problem_id"])
    .with_fetch_time_marker(FETCH_EPOCH_SECOND)
    .with_dependency(fetched_within(PROBLEM_MODELS, 7 * DAY).hard())
}

/// The submissions, contests, results and problem model datasets.
///
/// Submissions start from the beginning of the log; attach a bulk file with
/// [`with_submissions_base`] to skip most of it.
#[must_use]
pub fn default_registry() -> Registry {
    Registry::new()
        .with(submissions())
        .with(contests())
        .with(results())
        .with(problem_models())
}

/// Prepends the bulk submissions file at `path` to the submissions dataset.
///
/// A replaced bulk file changes its last epoch, which breaks a hard
/// constraint and discards the tail fetched on top of the old file.
#[must_use]
pub fn with_submissions_base(mut registry: Registry, path: &Path) -> Registry {
    if let Some(spec) = registry.get_mut(SUBMISSIONS) {
        spec.base_snapshot = Some(BaseSnapshot::new(path, "epoch_second"));
        spec.dependencies.push(
            Dependency::new(
                SelfMarker::Marker(BASE_LAST_EPOCH.into()),
                CompareOp::Eq,
                SUBMISSIONS,
                BASE_LAST_EPOCH_PREVIOUS,
            )
            .hard(),
        );
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_is_valid() {
        let registry = default_registry();
        registry.validate().unwrap();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec![SUBMISSIONS, CONTESTS, RESULTS, PROBLEM_MODELS]);

        let parsers = parsers();
        for spec in &registry.datasets {
            assert!(parsers.contains(&spec.parser), "{} has no parser", spec.name);
        }
    }

    #[test]
    fn raw_cache_only_for_immutable_payloads() {
        let registry = default_registry();
        let cached: Vec<&str> = registry
            .datasets
            .iter()
            .filter(|d| d.raw_cache)
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(cached, vec![RESULTS, PROBLEM_MODELS]);
    }

    #[test]
    fn base_snapshot_adds_hard_constraint() {
        let registry = with_submissions_base(default_registry(), Path::new("base/submissions.jsonl"));
        let spec = registry.get(SUBMISSIONS).unwrap();
        assert_eq!(spec.base_snapshot.as_ref().map(|b| b.ordering.as_str()), Some("epoch_second"));
        assert_eq!(spec.dependencies.len(), 3);
        registry.validate().unwrap();
    }

    #[test]
    fn registry_survives_json() {
        let registry = default_registry();
        let text = serde_json::to_string(&registry).unwrap();
        assert_eq!(Registry::from_json_str(&text).unwrap(), registry);
    }
}
