//! The local post log: an append-only, deduplicated mirror of the remote table.
//!
//! # Merge semantics
//!
//! The remote table is append-only and every delivery channel (bootstrap,
//! poll, push) is at-least-once. [`PostLog::merge_append`] treats
//! `source_id` as an idempotency key: a record is appended only the first
//! time its key is seen, whichever channel delivers it.
//!
//! The merge never re-sorts. Batches are expected to arrive ascending by
//! `created_at`; a batch that would step backwards is still appended (the
//! log never reorders existing entries) and the regression is counted in the
//! [`MergeReport`] so callers can log it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::post::Post;

/// Outcome of a single merge-append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records appended to the log.
    pub appended: usize,
    /// Records dropped because their `source_id` was already present.
    pub duplicates_skipped: usize,
    /// Appended records whose `created_at` precedes the record before them.
    pub out_of_order: usize,
}

/// Ascending, deduplicated sequence of posts.
#[derive(Debug, Clone, Default)]
pub struct PostLog {
    posts: Vec<Post>,
    seen: HashSet<String>,
}

impl PostLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole log with `posts` (bootstrap load).
    ///
    /// Duplicates within `posts` are dropped, first occurrence wins.
    pub fn replace(&mut self, posts: Vec<Post>) -> MergeReport {
        self.posts.clear();
        self.seen.clear();
        self.merge_append(posts)
    }

    /// Append every record whose `source_id` is not yet in the log.
    pub fn merge_append(&mut self, batch: impl IntoIterator<Item = Post>) -> MergeReport {
        let mut report = MergeReport::default();

        for post in batch {
            if self.seen.contains(&post.source_id) {
                report.duplicates_skipped += 1;
                continue;
            }
            if self
                .posts
                .last()
                .is_some_and(|last| post.created_at < last.created_at)
            {
                report.out_of_order += 1;
            }
            self.seen.insert(post.source_id.clone());
            self.posts.push(post);
            report.appended += 1;
        }

        report
    }

    /// `created_at` of the newest record, the lower bound for catch-up polls.
    #[must_use]
    pub fn last_created_at(&self) -> Option<DateTime<Utc>> {
        self.posts.last().map(|post| post.created_at)
    }

    #[must_use]
    pub fn contains(&self, source_id: &str) -> bool {
        self.seen.contains(source_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Read-only snapshot of the log, oldest first.
    #[must_use]
    pub fn as_slice(&self) -> &[Post] {
        &self.posts
    }

    /// Newest `n` posts, newest first.
    pub fn newest(&self, n: usize) -> impl Iterator<Item = &Post> {
        self.posts.iter().rev().take(n)
    }
}
