//! Store failures never stop ingestion; the next cycle retries.

use std::io::Write as _;

use xwall_core::error::{ErrorCode, StoreError};
use xwall_core::store::file::FileStore;
use xwall_core::store::memory::MemoryStore;
use xwall_core::store::{PostQuery, PostStore};
use xwall_core::sync::IngestionSync;

use generators::*;

#[test]
fn missing_file_then_created_recovers_on_poll() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("posts.jsonl");
    let store = FileStore::new(&path);

    let mut sync = IngestionSync::new();
    assert!(sync.apply_bootstrap(store.fetch_posts(&PostQuery::all())).is_none());
    assert!(sync.log().is_empty());

    let line = serde_json::to_string(&raw("a", 1)).expect("json");
    std::fs::write(&path, format!("{line}\n")).expect("write");

    let report = sync
        .apply_poll(store.fetch_posts(&sync.poll_query()))
        .expect("poll applied");
    assert_eq!(report.appended, 1);
    assert_eq!(sync.stats().fetch_failures, 1);
}

#[test]
fn appended_lines_are_picked_up_by_catch_up_polls() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "{}", serde_json::to_string(&raw("a", 1)).expect("json")).expect("write");
    let store = FileStore::new(file.path());

    let mut sync = IngestionSync::new();
    sync.apply_bootstrap(store.fetch_posts(&PostQuery::all()));

    writeln!(file, "{}", serde_json::to_string(&raw("b", 2)).expect("json")).expect("write");
    let query = sync.poll_query();
    let rows = store.fetch_posts(&query).expect("fetch");
    assert_eq!(rows.len(), 1, "only rows newer than the tail are fetched");

    sync.apply_poll(Ok(rows));
    let ids: Vec<_> = sync.posts().iter().map(|p| p.source_id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
}

#[test]
fn transient_failures_skip_cycles_without_losing_rows() {
    let store = MemoryStore::with_rows(vec![raw("a", 1)]);
    let mut sync = IngestionSync::new();
    sync.apply_bootstrap(store.fetch_posts(&PostQuery::all()));

    store.insert(raw("b", 2));
    store.fail_next_fetches(3);
    for _ in 0..3 {
        let result = store.fetch_posts(&sync.poll_query());
        assert!(matches!(&result, Err(err) if err.code() == ErrorCode::StoreUnreachable));
        assert!(sync.apply_poll(result).is_none());
    }
    assert_eq!(sync.log().len(), 1);

    sync.apply_poll(store.fetch_posts(&sync.poll_query()));
    assert_eq!(sync.log().len(), 2);
    assert_eq!(sync.stats().fetch_failures, 3);
    assert_eq!(sync.stats().polls, 4);
}

#[test]
fn rejected_request_is_logged_and_swallowed() {
    let mut sync = IngestionSync::new();
    let report = sync.apply_poll(Err(StoreError::Status {
        status: 401,
        body: r#"{"message":"Invalid API key"}"#.to_string(),
    }));
    assert!(report.is_none());
    assert_eq!(sync.stats().fetch_failures, 1);
}

#[test]
fn rows_without_identity_or_time_are_dropped_individually() {
    let mut no_time = raw("x", 1);
    no_time.created_at = None;
    let mut no_id = raw("y", 2);
    no_id.source_id = None;
    let mut bad_time = raw("z", 3);
    bad_time.created_at = Some("yesterday".to_string());

    let store = MemoryStore::with_rows(vec![raw("a", 0), no_time, no_id, bad_time, raw("b", 4)]);
    let mut sync = IngestionSync::new();
    sync.apply_bootstrap(store.fetch_posts(&PostQuery::all()));

    let ids: Vec<_> = sync.posts().iter().map(|p| p.source_id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
    assert_eq!(sync.stats().decode_failures, 3);
}
