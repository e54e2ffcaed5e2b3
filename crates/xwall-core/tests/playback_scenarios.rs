//! End-to-end playback scenarios: rows go through a store and the ingestion
//! sync before the scheduler sees them.

use std::io::Write as _;

use xwall_core::playback::{Cursor, LOOP_TAIL, PlaybackParams, STRIDE, Scheduler, Tick, WINDOW_SIZE};
use xwall_core::store::file::FileStore;
use xwall_core::store::memory::MemoryStore;
use xwall_core::store::{PostQuery, PostStore};
use xwall_core::sync::IngestionSync;

use generators::*;

fn bootstrapped(store: &dyn PostStore) -> IngestionSync {
    let mut sync = IngestionSync::new();
    sync.apply_bootstrap(store.fetch_posts(&PostQuery::all()));
    sync
}

fn global(tick: &Tick) -> usize {
    tick.frame().expect("a post is shown").global_index
}

#[test]
fn three_posts_from_file_loop_after_third() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    // Deliberately out of order in the file; the store sorts by created_at.
    for (id, secs) in [("c", 3), ("a", 1), ("b", 2)] {
        let line = serde_json::to_string(&raw(id, secs)).expect("json");
        writeln!(file, "{line}").expect("write");
    }
    let sync = bootstrapped(&FileStore::new(file.path()));
    let mut scheduler = Scheduler::default();

    let labels: Vec<(String, String)> = (0..4)
        .map(|_| {
            let tick = scheduler.tick(sync.posts());
            let frame = tick.frame().expect("frame");
            (frame.post.source_id.clone(), frame.label())
        })
        .collect();

    assert_eq!(
        labels,
        [
            ("a".to_string(), "1/3 · Window 1".to_string()),
            ("b".to_string(), "2/3 · Window 1".to_string()),
            ("c".to_string(), "3/3 · Window 1".to_string()),
            ("a".to_string(), "1/3 · Window 1".to_string()),
        ]
    );
}

#[test]
fn empty_store_shows_empty_state_every_tick() {
    let sync = bootstrapped(&MemoryStore::new());
    let mut scheduler = Scheduler::default();
    for _ in 0..10 {
        assert_eq!(scheduler.tick(sync.posts()), Tick::Empty);
    }
    assert_eq!(scheduler.cursor(), Cursor::default());
}

#[test]
fn twenty_posts_advance_one_stride_per_window() {
    let store = MemoryStore::with_rows((0..20).map(|i| raw(&format!("p{i:02}"), i)));
    let sync = bootstrapped(&store);
    let mut scheduler = Scheduler::default();

    for _ in 0..WINDOW_SIZE {
        scheduler.tick(sync.posts());
    }
    assert_eq!(scheduler.cursor(), Cursor::new(STRIDE, 0));

    let tick = scheduler.tick(sync.posts());
    assert_eq!(tick.frame().expect("frame").label(), "1/15 · Window 2");
}

#[test]
fn long_feed_eventually_cycles_over_the_tail() {
    let n: usize = 120;
    let store = MemoryStore::with_rows((0..n).map(|i| raw(&format!("p{i:03}"), i64::try_from(i).expect("small"))));
    let sync = bootstrapped(&store);
    let mut scheduler = Scheduler::default();

    let mut looped_at = None;
    let mut previous = scheduler.cursor();
    for step in 0..2_000 {
        scheduler.tick(sync.posts());
        let cursor = scheduler.cursor();
        if cursor.window_start < previous.window_start {
            looped_at = Some(step);
            assert_eq!(cursor, Cursor::new(n - LOOP_TAIL, 0));
            break;
        }
        previous = cursor;
    }
    assert!(looped_at.is_some(), "playback never looped");

    // From here on only the newest LOOP_TAIL posts are shown.
    for _ in 0..500 {
        assert!(global(&scheduler.tick(sync.posts())) >= n - LOOP_TAIL);
    }
}

#[test]
fn live_growth_is_played_before_looping() {
    let store = MemoryStore::with_rows((0..3).map(|i| raw(&format!("p{i}"), i)));
    let mut sync = bootstrapped(&store);
    let mut scheduler = Scheduler::default();

    assert_eq!(global(&scheduler.tick(sync.posts())), 0);
    assert_eq!(global(&scheduler.tick(sync.posts())), 1);

    // Two posts arrive over push before the window is exhausted.
    sync.apply_push(raw("p3", 3));
    sync.apply_push(raw("p4", 4));

    let shown: Vec<usize> = (0..4).map(|_| global(&scheduler.tick(sync.posts()))).collect();
    assert_eq!(shown, [2, 3, 4, 0]);
}

#[test]
fn replace_that_shrinks_log_resyncs_cursor() {
    let store = MemoryStore::with_rows((0..40).map(|i| raw(&format!("p{i:02}"), i)));
    let mut sync = bootstrapped(&store);
    let params = PlaybackParams::default();
    let mut scheduler = Scheduler::with_cursor(params, Cursor::new(30, 2));
    assert_eq!(global(&scheduler.tick(sync.posts())), 32);

    // A fresh bootstrap against a smaller table.
    sync.apply_bootstrap(Ok((0..5).map(|i| raw(&format!("q{i}"), i)).collect()));
    assert_eq!(scheduler.tick(sync.posts()), Tick::Resynced);
    assert_eq!(global(&scheduler.tick(sync.posts())), 0);
}

#[test]
fn engagement_is_stable_across_passes() {
    let store = MemoryStore::with_rows((0..3).map(|i| raw(&format!("p{i}"), i)));
    let sync = bootstrapped(&store);
    let mut scheduler = Scheduler::default();

    let first_pass: Vec<_> = (0..3)
        .map(|_| scheduler.tick(sync.posts()).frame().expect("frame").engagement)
        .collect();
    let second_pass: Vec<_> = (0..3)
        .map(|_| scheduler.tick(sync.posts()).frame().expect("frame").engagement)
        .collect();
    assert_eq!(first_pass, second_pass);
}
