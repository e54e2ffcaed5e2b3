//! In-process post table. Used by tests and the offline simulator.
//!
//! Inserting a row fans it out to every live subscriber synchronously, on
//! the inserting thread, the same way a Realtime channel would deliver it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::{PostQuery, PostStore, PushEvent, PushSink, Subscription};
use crate::error::StoreError;
use crate::post::{Post, RawPost, parse_timestamp};

#[derive(Default)]
struct Inner {
    rows: Mutex<Vec<RawPost>>,
    sinks: Mutex<Vec<(u64, PushSink)>>,
    next_sink_id: AtomicU64,
    failures_pending: AtomicUsize,
    fetches: AtomicUsize,
}

/// Shared in-memory table. Clones refer to the same table.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed rows without notifying subscribers.
    #[must_use]
    pub fn with_rows(rows: impl IntoIterator<Item = RawPost>) -> Self {
        let store = Self::new();
        lock(&store.inner.rows).extend(rows);
        store
    }

    /// Insert a row and push it to every subscriber.
    pub fn insert(&self, row: RawPost) {
        lock(&self.inner.rows).push(row.clone());
        for (_, sink) in lock(&self.inner.sinks).iter_mut() {
            sink(PushEvent::Inserted(row.clone()));
        }
    }

    /// Insert an already-decoded post.
    pub fn insert_post(&self, post: &Post) {
        self.insert(to_raw(post));
    }

    /// Make the next `n` fetches fail with a transport error.
    pub fn fail_next_fetches(&self, n: usize) {
        self.inner.failures_pending.store(n, Ordering::SeqCst);
    }

    /// Number of fetches served, failed ones included.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.sinks).len()
    }
}

impl PostStore for MemoryStore {
    fn fetch_posts(&self, query: &PostQuery) -> Result<Vec<RawPost>, StoreError> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        let pending = self.inner.failures_pending.load(Ordering::SeqCst);
        if pending > 0 {
            self.inner
                .failures_pending
                .store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Transport("injected failure".into()));
        }

        let rows = lock(&self.inner.rows).clone();
        Ok(select_rows(rows, query))
    }

    fn subscribe(&self, mut sink: PushSink) -> Result<Subscription, StoreError> {
        let id = self.inner.next_sink_id.fetch_add(1, Ordering::SeqCst);
        sink(PushEvent::Connected);
        lock(&self.inner.sinks).push((id, sink));

        let inner = Arc::clone(&self.inner);
        Ok(Subscription::on_cancel(move || {
            lock(&inner.sinks).retain(|(sink_id, _)| *sink_id != id);
        }))
    }

    fn describe(&self) -> String {
        format!("memory ({} rows)", lock(&self.inner.rows).len())
    }
}

/// Filter and order rows the way the remote query does.
///
/// Rows whose `created_at` does not parse sort first and are only returned
/// by unfiltered queries.
pub(crate) fn select_rows(rows: Vec<RawPost>, query: &PostQuery) -> Vec<RawPost> {
    let mut keyed: Vec<(Option<DateTime<Utc>>, RawPost)> = rows
        .into_iter()
        .map(|row| {
            let ts = row
                .created_at
                .as_deref()
                .and_then(|raw| parse_timestamp(raw).ok());
            (ts, row)
        })
        .filter(|(ts, _)| match (query.after, ts) {
            (None, _) => true,
            (Some(after), Some(ts)) => *ts > after,
            (Some(_), None) => false,
        })
        .collect();

    keyed.sort_by(|(a_ts, a), (b_ts, b)| {
        a_ts.cmp(b_ts)
            .then_with(|| a.source_id.cmp(&b.source_id))
    });
    keyed.into_iter().map(|(_, row)| row).collect()
}

pub(crate) fn to_raw(post: &Post) -> RawPost {
    RawPost {
        id: Some(serde_json::Value::String(post.display_id.clone())),
        source_id: Some(post.source_id.clone()),
        author_name: Some(post.author_name.clone()),
        author_handle: Some(post.author_handle.clone()),
        avatar_url: Some(post.avatar_url.clone()),
        content: Some(post.content.clone()),
        media_url: post.media_url.clone(),
        created_at: Some(post.created_at.to_rfc3339()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::mpsc;

    fn row(id: &str, secs: i64) -> RawPost {
        let ts = Utc.timestamp_opt(secs, 0).single().expect("ts");
        to_raw(&Post::new(id, ts))
    }

    fn source_ids(rows: &[RawPost]) -> Vec<String> {
        rows.iter()
            .map(|r| r.source_id.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn fetch_orders_ascending_with_source_id_tiebreak() {
        let store = MemoryStore::with_rows([row("c", 3), row("b", 1), row("a", 1)]);
        let rows = store.fetch_posts(&PostQuery::all()).expect("fetch");
        assert_eq!(source_ids(&rows), ["a", "b", "c"]);
    }

    #[test]
    fn fetch_after_filters_strictly() {
        let store = MemoryStore::with_rows([row("a", 1), row("b", 2), row("c", 3)]);
        let after = Utc.timestamp_opt(2, 0).single().expect("ts");
        let rows = store.fetch_posts(&PostQuery::after(after)).expect("fetch");
        assert_eq!(source_ids(&rows), ["c"]);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let store = MemoryStore::with_rows([row("a", 1)]);
        store.fail_next_fetches(1);
        assert!(store.fetch_posts(&PostQuery::all()).is_err());
        assert_eq!(store.fetch_posts(&PostQuery::all()).expect("fetch").len(), 1);
        assert_eq!(store.fetch_count(), 2);
    }

    #[test]
    fn insert_pushes_to_subscribers_until_unsubscribed() {
        let store = MemoryStore::new();
        let (tx, rx) = mpsc::channel();
        let sub = store
            .subscribe(Box::new(move |event| {
                let _ = tx.send(event);
            }))
            .expect("subscribe");

        assert_eq!(rx.try_recv().ok(), Some(PushEvent::Connected));
        store.insert(row("a", 1));
        assert!(matches!(rx.try_recv(), Ok(PushEvent::Inserted(_))));

        sub.unsubscribe();
        assert_eq!(store.subscriber_count(), 0);
        store.insert(row("b", 2));
        assert!(rx.try_recv().is_err());
    }
}
