//! End-to-end sync scenarios against a scripted origin.

use acdb_storage::{read_table_file, CacheStore, FileStateStore, Marker, Markers, StateStore};
use acdb_sync_engine::{
    BaseSnapshot, CompareOp, Cursor, DatasetPhase, DatasetSpec, Dependency, DerivedMarker,
    PaginatedConfig, PostProcess, Registry, SelfMarker, Severity, SingleShotConfig, SourceSpec,
    SyncError, TimeSeriesConfig, WorklistConfig, BASE_LAST_EPOCH, LAST_CURSOR,
};
use acdb_table::{to_jsonl, Filter, Row, Table, Value};
use acdb_testkit::prelude::*;
use std::fs;

const FROM: &str = "https://origin/from/{}";
const ARCHIVE: &str = "https://origin/archive?page={}";

fn from(t: i64) -> String {
    format!("https://origin/from/{t}")
}

fn archive(page: u64) -> String {
    format!("https://origin/archive?page={page}")
}

fn time_series(origin: i64) -> DatasetSpec {
    DatasetSpec::new(
        "events",
        "json_rows",
        SourceSpec::TimeSeries(TimeSeriesConfig::new(FROM, "t").with_origin(origin).with_page_size(20)),
    )
    .with_uniqueness(["id"])
}

fn markers_of(state: &dyn StateStore, dataset: &str) -> Markers {
    state.read(dataset, &Markers::new())
}

#[test]
fn time_series_fetches_missing_tail() {
    let origin = ScriptedClient::new()
        .page(from(100), rows_body(&events(101..=120)))
        .page(from(120), rows_body(&events(121..=140)))
        .page(from(140), rows_body(&events(141..=150)));
    let mut fx = MemoryFixture::new(Registry::new().with(time_series(0)), origin);
    fx.cache.save("events", &Table::from_rows(events(1..=100))).unwrap();

    let outcome = fx.engine.sync("events").unwrap();

    assert_eq!(outcome.added, 50);
    assert_eq!(outcome.requests, 3);
    assert_eq!(outcome.total, 150);
    assert_eq!(outcome.cursor, Some(Cursor::After(Value::Integer(150))));
    assert_eq!(fx.origin.requests(), vec![from(100), from(120), from(140)]);
    assert_eq!(
        markers_of(&fx.state, "events").get(LAST_CURSOR),
        Some(&Marker::Integer(150))
    );
    assert_eq!(fx.cache.load("events").unwrap().map(|t| t.len()), Some(150));
}

#[test]
fn overlapping_time_series_pages_are_deduplicated() {
    // the origin answers inclusively, so every page repeats the tail row
    let origin = ScriptedClient::new()
        .page(from(10), rows_body(&events(10..=29)))
        .page(from(29), rows_body(&events(29..=35)));
    let mut fx = MemoryFixture::new(Registry::new().with(time_series(0)), origin);
    fx.cache.save("events", &Table::from_rows(events(1..=10))).unwrap();

    let outcome = fx.engine.sync("events").unwrap();
    assert_eq!(outcome.added, 25);
    let table = fx.engine.table("events").unwrap();
    assert_eq!(table.len(), 35);
    assert_eq!(table.key_set(&["id"]).len(), 35);
}

#[test]
fn single_value_page_is_set_aside() {
    let origin = ScriptedClient::new().page(from(5), rows_body(&[event(6, 7), event(7, 7)]));
    let mut fx = MemoryFixture::new(Registry::new().with(time_series(0)), origin);
    fx.cache.save("events", &Table::from_rows(events(1..=5))).unwrap();

    let outcome = fx.engine.sync("events").unwrap();
    assert_eq!(outcome.added, 0);
    assert_eq!(outcome.requests, 1);
    assert_eq!(fx.cache.raw_len(), 0);
}

#[test]
fn shallow_listing_stops_at_known_rows() {
    let spec = DatasetSpec::new("contests", "json_rows", SourceSpec::Paginated(PaginatedConfig::new(ARCHIVE)))
        .with_uniqueness(["id"])
        .break_on_duplication()
        .without_raw_cache();
    let origin = ScriptedClient::new()
        .page(archive(1), rows_body(&events([12, 11, 10, 9])))
        .page(archive(2), rows_body(&events([8, 7])));
    let mut fx = MemoryFixture::new(Registry::new().with(spec), origin);
    fx.cache.save("contests", &Table::from_rows(events(1..=10))).unwrap();

    let outcome = fx.engine.sync("contests").unwrap();
    assert_eq!(outcome.added, 2);
    assert_eq!(fx.origin.requests(), vec![archive(1)]);
}

#[test]
fn full_listing_walks_until_empty_page() {
    let spec = DatasetSpec::new("contests", "json_rows", SourceSpec::Paginated(PaginatedConfig::new(ARCHIVE)))
        .with_uniqueness(["id"])
        .without_raw_cache();
    let origin = ScriptedClient::new()
        .page(archive(1), rows_body(&events([6, 5])))
        .page(archive(2), rows_body(&events([4, 3])))
        .page(archive(3), "[]");
    let mut fx = MemoryFixture::new(Registry::new().with(spec), origin);

    let outcome = fx.engine.sync("contests").unwrap();
    assert_eq!(outcome.added, 4);
    assert_eq!(outcome.requests, 3);
    assert_eq!(outcome.cursor, Some(Cursor::Page(4)));
}

#[test]
fn failed_sync_resumes_where_it_stopped() {
    let origin = ScriptedClient::new()
        .page(from(100), rows_body(&events(101..=120)))
        .page(from(120), rows_body(&events(121..=140)))
        .page(from(140), rows_body(&events(141..=160)))
        .page(from(160), rows_body(&events(161..=170)));
    origin.fail(from(140));
    let mut fx = DiskFixture::new(Registry::new().with(time_series(100)), origin);

    let err = fx.engine.sync("events").unwrap_err();
    assert!(matches!(err, SyncError::Transport { .. }));
    assert_eq!(err.dataset(), Some("events"));
    assert_eq!(fx.engine.phase("events"), DatasetPhase::Loaded(Severity::Soft));

    // partial table persisted, state untouched
    let saved = read_table_file(&fx.table_path("events")).unwrap().unwrap();
    assert_eq!(saved.len(), 40);
    assert!(FileStateStore::new(fx.state_path()).load_all().get("events").is_none());

    fx.origin.heal(&from(140));
    fx.origin.clear_requests();
    fx.restart();

    assert_eq!(fx.engine.table("events").unwrap().len(), 40);
    let outcome = fx.engine.sync("events").unwrap();
    assert_eq!(fx.origin.requests(), vec![from(140), from(160)]);
    assert_eq!(outcome.added, 30);
    assert_eq!(outcome.total, 70);
}

#[test]
fn second_sync_without_news_changes_nothing() {
    let origin = ScriptedClient::new()
        .page(from(0), rows_body(&events(1..=5)))
        .page(from(5), rows_body(&events(5..=5)));
    let mut fx = DiskFixture::new(Registry::new().with(time_series(0)), origin);

    fx.engine.sync("events").unwrap();
    let table_bytes = fs::read(fx.table_path("events")).unwrap();
    let state_bytes = fs::read(fx.state_path()).unwrap();

    fx.restart();
    let outcome = fx.engine.sync("events").unwrap();
    assert_eq!(outcome.added, 0);
    assert_eq!(fs::read(fx.table_path("events")).unwrap(), table_bytes);
    assert_eq!(fs::read(fx.state_path()).unwrap(), state_bytes);
}

#[test]
fn malformed_payload_is_fatal_but_keeps_progress() {
    let spec = DatasetSpec::new("contests", "json_rows", SourceSpec::Paginated(PaginatedConfig::new(ARCHIVE)))
        .with_uniqueness(["id"]);
    let origin = ScriptedClient::new()
        .page(archive(1), rows_body(&events([3, 2])))
        .page(archive(2), "<html>maintenance</html>");
    let mut fx = MemoryFixture::new(Registry::new().with(spec), origin);

    let err = fx.engine.sync("contests").unwrap_err();
    assert!(matches!(err, SyncError::Payload { .. }));
    assert_eq!(fx.cache.load("contests").unwrap().map(|t| t.len()), Some(2));
    assert!(fx.state.load_all().get("contests").is_none());
}

fn contests_spec() -> DatasetSpec {
    DatasetSpec::new(
        "contests",
        "json_rows",
        SourceSpec::SingleShot(SingleShotConfig::new("https://origin/contests.json")),
    )
    .with_uniqueness(["contest_id"])
    .with_derived_marker(DerivedMarker::RecentKeys {
        marker: "recent".into(),
        key_column: "contest_id".into(),
        time_column: "end".into(),
        window_secs: 30 * 86_400,
        filters: vec![Filter::equals("rated", 1)],
    })
}

fn results_spec() -> DatasetSpec {
    DatasetSpec::new(
        "results",
        "json_rows",
        SourceSpec::Worklist(
            WorklistConfig::new("https://origin/contests/{}/results", "contests", "contest_id")
                .with_predicate(Filter::equals("rated", 1))
                .most_recent_first("start"),
        ),
    )
    .with_uniqueness(["contest_id", "user_id"])
    .with_dependency(
        Dependency::new(
            SelfMarker::Virtual {
                column: "contest_id".into(),
            },
            CompareOp::SetGe,
            "contests",
            "recent",
        )
        .hard(),
    )
}

fn contest(id: &str, start: i64, rated: i64) -> Row {
    Row::new()
        .with("contest_id", id)
        .with("start", start)
        .with("end", start + 6_000)
        .with("rated", rated)
}

fn result(contest_id: &str, user: &str) -> Row {
    Row::new().with("contest_id", contest_id).with("user_id", user)
}

fn contest_origin() -> ScriptedClient {
    ScriptedClient::new()
        .page(
            "https://origin/contests.json",
            rows_body(&[
                contest("old1", FIXTURE_NOW - 40 * 86_400, 1),
                contest("abc1", FIXTURE_NOW - 20_000, 1),
                contest("arc1", FIXTURE_NOW - 15_000, 0),
                contest("abc2", FIXTURE_NOW - 10_000, 1),
            ]),
        )
        .page(
            "https://origin/contests/abc2/results",
            rows_body(&[result("abc2", "alice"), result("abc2", "bob")]),
        )
        .page("https://origin/contests/abc1/results", rows_body(&[result("abc1", "alice")]))
        .page("https://origin/contests/old1/results", rows_body(&[result("old1", "carol")]))
}

#[test]
fn worklist_follows_source_dataset() {
    let registry = Registry::new().with(contests_spec()).with(results_spec());
    let mut fx = MemoryFixture::new(registry, contest_origin());

    fx.engine.sync("contests").unwrap();
    let recent = markers_of(&fx.state, "contests").get("recent").cloned();
    assert_eq!(recent, Some(Marker::List(vec!["abc1".into(), "abc2".into()])));

    let evaluation = fx.engine.evaluate("results").unwrap();
    assert_eq!(evaluation.severity, Severity::Hard);
    assert_eq!(evaluation.failures[0].missing.len(), 2);

    fx.origin.clear_requests();
    let table = fx.engine.table("results").unwrap().clone();
    assert_eq!(
        fx.origin.requests(),
        vec![
            "https://origin/contests/abc2/results",
            "https://origin/contests/abc1/results",
            "https://origin/contests/old1/results",
        ]
    );
    assert_eq!(table.len(), 4);
    assert_eq!(fx.engine.evaluate("results").unwrap().severity, Severity::Fresh);

    let alice = fx.engine.filter("results", &[Filter::equals("user_id", "alice")]).unwrap();
    assert_eq!(alice.len(), 2);
}

#[test]
fn hard_stale_dataset_is_rebuilt() {
    let registry = Registry::new().with(contests_spec()).with(results_spec());
    let mut fx = MemoryFixture::new(registry, contest_origin());
    fx.cache
        .save("results", &Table::from_rows(vec![result("gone", "mallory")]))
        .unwrap();
    let mut leftover = Markers::new();
    leftover.insert("checked_at".into(), Marker::Integer(FIXTURE_NOW - 1));
    fx.state.write("results", &leftover).unwrap();
    fx.engine.sync("contests").unwrap();

    let outcome = fx.engine.sync("results").unwrap();
    assert!(outcome.reset);
    assert_eq!(outcome.severity, Severity::Hard);
    let table = fx.engine.table("results").unwrap();
    assert_eq!(table.len(), 4);
    assert!(table.filter(&[Filter::equals("contest_id", "gone")]).is_empty());
    assert_eq!(markers_of(&fx.state, "results").get("checked_at"), None);
}

#[test]
fn fetch_time_marker_drives_soft_refresh() {
    let spec = DatasetSpec::new(
        "models",
        "json_rows",
        SourceSpec::SingleShot(SingleShotConfig::new("https://origin/models.json")),
    )
    .with_uniqueness(["id"])
    .without_raw_cache()
    .with_fetch_time_marker("fetched_at")
    .with_dependency(Dependency::new(SelfMarker::Now, CompareOp::Lt, "models", "fetched_at").with_gap(-3_600));
    let origin = ScriptedClient::new().page("https://origin/models.json", rows_body(&events(1..=3)));
    let mut fx = DiskFixture::new(Registry::new().with(spec), origin);

    // never fetched: the marker is missing, so the first read syncs
    assert_eq!(fx.engine.table("models").unwrap().len(), 3);
    assert_eq!(fx.origin.requests().len(), 1);
    let state = FileStateStore::new(fx.state_path());
    assert_eq!(markers_of(&state, "models").get("fetched_at"), Some(&Marker::Integer(FIXTURE_NOW)));

    fx.restart_at(FIXTURE_NOW + 100);
    fx.engine.table("models").unwrap();
    assert_eq!(fx.origin.requests().len(), 1);

    fx.restart_at(FIXTURE_NOW + 4_000);
    assert_eq!(fx.engine.status("models").unwrap().phase, DatasetPhase::Loaded(Severity::Soft));
    fx.engine.table("models").unwrap();
    assert_eq!(fx.origin.requests().len(), 2);
    assert_eq!(
        markers_of(&state, "models").get("fetched_at"),
        Some(&Marker::Integer(FIXTURE_NOW + 4_000))
    );
}

#[test]
fn forced_reinit_ignores_persisted_markers() {
    let spec = DatasetSpec::new(
        "models",
        "json_rows",
        SourceSpec::SingleShot(SingleShotConfig::new("https://origin/models.json")),
    )
    .with_uniqueness(["id"])
    .without_raw_cache()
    .with_fetch_time_marker("fetched_at")
    .with_dependency(Dependency::new(SelfMarker::Now, CompareOp::Lt, "models", "fetched_at").with_gap(-3_600));
    let origin = ScriptedClient::new().page("https://origin/models.json", rows_body(&events(1..=3)));
    let mut fx = DiskFixture::new(Registry::new().with(spec), origin);
    fx.engine.sync("models").unwrap();
    let state = FileStateStore::new(fx.state_path());
    assert_eq!(markers_of(&state, "models").get("fetched_at"), Some(&Marker::Integer(FIXTURE_NOW)));

    // within the hour the persisted marker keeps the table fresh
    fx.restart_at(FIXTURE_NOW + 100);
    assert_eq!(fx.engine.status("models").unwrap().phase, DatasetPhase::Loaded(Severity::Fresh));

    fx.restart_with(FIXTURE_NOW + 100, |config| config.with_force_reinit(true));
    assert_eq!(fx.engine.status("models").unwrap().phase, DatasetPhase::Loaded(Severity::Soft));
    assert_eq!(markers_of(&state, "models").get("fetched_at"), Some(&Marker::Null));

    assert_eq!(fx.engine.table("models").unwrap().len(), 3);
    assert_eq!(fx.origin.requests().len(), 2);
    assert_eq!(
        markers_of(&state, "models").get("fetched_at"),
        Some(&Marker::Integer(FIXTURE_NOW + 100))
    );
}

#[test]
fn supplement_is_merged_then_sorted() {
    let spec = DatasetSpec::new("contests", "json_rows", SourceSpec::Paginated(PaginatedConfig::new(ARCHIVE)))
        .with_uniqueness(["contest_id"])
        .with_post_process(PostProcess::MergeSupplement {
            url: "https://origin/contests.json".into(),
            parser: "json_rows".into(),
        })
        .with_post_process(PostProcess::SortBy {
            column: "start".into(),
        });
    let origin = ScriptedClient::new()
        .page(archive(1), rows_body(&[contest("c3", 30, 1), contest("c2", 20, 1)]))
        .page(archive(2), "[]")
        .page(
            "https://origin/contests.json",
            rows_body(&[contest("c2", 20, 1), contest("c1", 10, 0), contest("c4", 40, 1)]),
        );
    let mut fx = MemoryFixture::new(Registry::new().with(spec), origin);

    let outcome = fx.engine.sync("contests").unwrap();
    assert_eq!(outcome.added, 4);
    assert_eq!(outcome.requests, 3);
    let ids: Vec<Value> = fx.engine.table("contests").unwrap().column("contest_id").cloned().collect();
    assert_eq!(ids, vec!["c1".into(), "c2".into(), "c3".into(), "c4".into()]);
}

#[test]
fn recent_keys_hook_spans_cached_and_new_rows() {
    let spec = time_series(0).with_post_process(PostProcess::RecordRecentKeys {
        column: "contest".into(),
        marker: "recent_contests".into(),
    });
    let tagged = |id: i64, contest: &str| event(id, id).with("contest", contest);
    let origin = ScriptedClient::new().page(
        from(2),
        rows_body(&[tagged(3, "abc2"), tagged(4, "abc3"), tagged(5, "abc2")]),
    );
    let mut fx = MemoryFixture::new(Registry::new().with(spec), origin);
    fx.cache
        .save("events", &Table::from_rows(vec![tagged(1, "abc1"), tagged(2, "abc1")]))
        .unwrap();

    fx.engine.sync("events").unwrap();
    assert_eq!(
        markers_of(&fx.state, "events").get("recent_contests"),
        Some(&Marker::List(vec!["abc1".into(), "abc2".into(), "abc3".into()]))
    );
}

#[test]
fn base_snapshot_is_prepended_but_not_persisted() {
    let base_dir = tempfile::tempdir().unwrap();
    let base_path = base_dir.path().join("events.jsonl");
    let base: Vec<Row> = (1..=5).map(|i| event(i, FIXTURE_NOW - 1_000 + i)).collect();
    // out of order on disk; the engine sorts it
    let mut shuffled = base.clone();
    shuffled.reverse();
    fs::write(&base_path, to_jsonl(&Table::from_rows(shuffled)).unwrap()).unwrap();

    let spec = time_series(0).with_base_snapshot(BaseSnapshot::new(&base_path, "t"));
    let fresh: Vec<Row> = (6..=8).map(|i| event(i, FIXTURE_NOW - 900 + i)).collect();
    let origin = ScriptedClient::new().page(from(FIXTURE_NOW - 995), rows_body(&fresh));
    let mut fx = DiskFixture::new(Registry::new().with(spec), origin);

    let outcome = fx.engine.sync("events").unwrap();
    assert_eq!(outcome.added, 3);
    assert_eq!(outcome.total, 8);
    let status = fx.engine.status("events").unwrap();
    assert_eq!(status.base_rows, 5);

    let saved = read_table_file(&fx.table_path("events")).unwrap().unwrap();
    assert_eq!(saved, Table::from_rows(fresh));
    let state = FileStateStore::new(fx.state_path());
    assert_eq!(
        markers_of(&state, "events").get(BASE_LAST_EPOCH),
        Some(&Marker::Integer(FIXTURE_NOW - 995))
    );
}

#[test]
fn stale_or_missing_base_snapshot_is_an_error() {
    let base_dir = tempfile::tempdir().unwrap();
    let stale_path = base_dir.path().join("stale.jsonl");
    let old = Table::from_rows(vec![event(1, FIXTURE_NOW - 900_000)]);
    fs::write(&stale_path, to_jsonl(&old).unwrap()).unwrap();

    let spec = time_series(0).with_base_snapshot(BaseSnapshot::new(&stale_path, "t"));
    let mut fx = MemoryFixture::new(Registry::new().with(spec), ScriptedClient::new());
    let err = fx.engine.table("events").unwrap_err();
    assert!(matches!(err, SyncError::StaleBaseSnapshot { age_secs: 900_000, .. }));

    let spec = time_series(0).with_base_snapshot(BaseSnapshot::new(base_dir.path().join("none.jsonl"), "t"));
    let mut fx = MemoryFixture::new(Registry::new().with(spec), ScriptedClient::new());
    let err = fx.engine.table("events").unwrap_err();
    assert!(matches!(err, SyncError::MissingBaseSnapshot { .. }));
    assert!(fx.origin.requests().is_empty());
}

#[test]
fn reset_forgets_everything() {
    let origin = ScriptedClient::new().page(from(0), rows_body(&events(1..=3)));
    let mut fx = DiskFixture::new(Registry::new().with(time_series(0)), origin);
    fx.engine.sync("events").unwrap();
    assert!(fx.table_path("events").exists());

    fx.engine.reset("events").unwrap();
    assert!(!fx.table_path("events").exists());
    assert_eq!(fx.engine.phase("events"), DatasetPhase::Unloaded);

    // no table left, so the next read fetches again; the raw response
    // was dropped too
    fx.origin.clear_requests();
    assert_eq!(fx.engine.table("events").unwrap().len(), 3);
    assert_eq!(fx.origin.requests(), vec![from(0)]);
}

#[test]
fn unknown_dataset_is_reported() {
    let mut fx = MemoryFixture::new(Registry::new().with(time_series(0)), ScriptedClient::new());
    assert!(matches!(fx.engine.table("nope"), Err(SyncError::UnknownDataset(_))));
}
