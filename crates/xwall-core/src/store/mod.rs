//! The seam between the wall and wherever posts are persisted.
//!
//! A [`PostStore`] answers two questions: "give me everything newer than X,
//! oldest first" and "tell me about new rows as they are inserted". The
//! runtime only ever talks to this trait.
//!
//! Implementations:
//! - [`supabase::SupabaseStore`] - PostgREST queries plus a Realtime websocket.
//! - [`memory::MemoryStore`] - in-process table with synchronous push fan-out.
//! - [`file::FileStore`] - read-only replay of a JSON/JSONL export.

pub mod file;
pub mod memory;
pub mod realtime;
pub mod supabase;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::post::{Post, RawPost};

/// Filter for [`PostStore::fetch_posts`]. Results are always ascending by
/// `created_at`, then `source_id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostQuery {
    /// Only rows with `created_at` strictly greater than this.
    pub after: Option<DateTime<Utc>>,
}

impl PostQuery {
    /// Unfiltered query, used for bootstrap and for polls on an empty log.
    #[must_use]
    pub const fn all() -> Self {
        Self { after: None }
    }

    #[must_use]
    pub const fn after(ts: DateTime<Utc>) -> Self {
        Self { after: Some(ts) }
    }

    #[must_use]
    pub fn matches(&self, post: &Post) -> bool {
        self.after.is_none_or(|after| post.created_at > after)
    }
}

/// Notification delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// A row was inserted into the watched table.
    Inserted(RawPost),
    /// The push channel is (re)connected.
    Connected,
    /// The push channel dropped; the store will keep retrying.
    Disconnected,
}

/// Callback receiving push events. Runs on the subscription's own thread.
pub type PushSink = Box<dyn FnMut(PushEvent) + Send + 'static>;

/// A queryable, subscribable post table.
pub trait PostStore: Send + Sync {
    /// Fetch rows matching `query`, ascending by `created_at`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on transport failure or a rejected request.
    fn fetch_posts(&self, query: &PostQuery) -> Result<Vec<RawPost>, StoreError>;

    /// Start delivering inserted rows to `sink` until the returned handle
    /// is dropped or [`Subscription::unsubscribe`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Subscribe`] if the subscription cannot start.
    fn subscribe(&self, sink: PushSink) -> Result<Subscription, StoreError>;

    /// Short description for logs and status lines.
    fn describe(&self) -> String;
}

/// Handle for an active subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// A subscription that never delivers anything.
    pub fn idle() -> Self {
        Self { cancel: None }
    }

    /// A subscription torn down by running `cancel` exactly once.
    pub fn on_cancel(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop delivery and release the underlying channel.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn query_after_is_strict() {
        let ts = Utc.timestamp_opt(100, 0).single().expect("ts");
        let query = PostQuery::after(ts);
        assert!(!query.matches(&Post::new("same", ts)));
        assert!(query.matches(&Post::new("later", ts + chrono::Duration::seconds(1))));
        assert!(PostQuery::all().matches(&Post::new("any", ts)));
    }

    #[test]
    fn subscription_cancels_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = Subscription::on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(sub.is_active());
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let counter = Arc::clone(&calls);
            let _sub = Subscription::on_cancel(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn idle_subscription_is_inactive() {
        assert!(!Subscription::idle().is_active());
    }
}
