//! Ingestion sync: folds bootstrap, poll and push deliveries into the log.
//!
//! The sync owns the [`PostLog`]. It never performs I/O itself; the runtime
//! hands it the outcome of each fetch or push and it decides what to keep.
//! Every failure is logged and swallowed so the next cycle can retry.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::log::{MergeReport, PostLog};
use crate::post::{Post, RawPost};
use crate::store::PostQuery;

/// Which channel delivered a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Bootstrap,
    Poll,
    Push,
}

impl Channel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Poll => "poll",
            Self::Push => "push",
        }
    }
}

/// Running totals, shown on the wall's status line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub bootstraps: u64,
    pub polls: u64,
    pub pushes: u64,
    pub appended: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    pub fetch_failures: u64,
    pub decode_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct IngestionSync {
    log: PostLog,
    stats: SyncStats,
}

impl IngestionSync {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn log(&self) -> &PostLog {
        &self.log
    }

    #[must_use]
    pub fn posts(&self) -> &[Post] {
        self.log.as_slice()
    }

    #[must_use]
    pub const fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Query for the next catch-up poll: everything strictly newer than the
    /// last record, or everything when the log is empty.
    #[must_use]
    pub fn poll_query(&self) -> PostQuery {
        self.log
            .last_created_at()
            .map_or_else(PostQuery::all, PostQuery::after)
    }

    /// Apply the initial bulk load. On success the log is replaced.
    pub fn apply_bootstrap(
        &mut self,
        result: Result<Vec<RawPost>, StoreError>,
    ) -> Option<MergeReport> {
        self.stats.bootstraps += 1;
        let rows = self.accept(Channel::Bootstrap, result)?;
        let posts = self.decode_rows(Channel::Bootstrap, rows);
        let report = self.log.replace(posts);
        Some(self.record(Channel::Bootstrap, report))
    }

    /// Apply a catch-up poll result.
    pub fn apply_poll(&mut self, result: Result<Vec<RawPost>, StoreError>) -> Option<MergeReport> {
        self.stats.polls += 1;
        let rows = self.accept(Channel::Poll, result)?;
        let posts = self.decode_rows(Channel::Poll, rows);
        let report = self.log.merge_append(posts);
        Some(self.record(Channel::Poll, report))
    }

    /// Apply a single pushed insert.
    pub fn apply_push(&mut self, row: RawPost) -> Option<MergeReport> {
        self.stats.pushes += 1;
        let posts = self.decode_rows(Channel::Push, vec![row]);
        if posts.is_empty() {
            return None;
        }
        let report = self.log.merge_append(posts);
        Some(self.record(Channel::Push, report))
    }

    fn accept(
        &mut self,
        channel: Channel,
        result: Result<Vec<RawPost>, StoreError>,
    ) -> Option<Vec<RawPost>> {
        match result {
            Ok(rows) => Some(rows),
            Err(err) => {
                self.stats.fetch_failures += 1;
                tracing::warn!(
                    channel = channel.as_str(),
                    code = %err.code(),
                    error = %err,
                    log_len = self.log.len(),
                    "fetch failed, will retry next cycle"
                );
                None
            }
        }
    }

    fn decode_rows(&mut self, channel: Channel, rows: Vec<RawPost>) -> Vec<Post> {
        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            match Post::from_raw(row) {
                Ok(post) => posts.push(post),
                Err(err) => {
                    self.stats.decode_failures += 1;
                    tracing::warn!(
                        channel = channel.as_str(),
                        code = %err.code(),
                        error = %err,
                        "skipping undecodable row"
                    );
                }
            }
        }
        posts
    }

    fn record(&mut self, channel: Channel, report: MergeReport) -> MergeReport {
        self.stats.appended += report.appended as u64;
        self.stats.duplicates += report.duplicates_skipped as u64;
        self.stats.out_of_order += report.out_of_order as u64;
        self.stats.last_success = Some(Utc::now());

        if report.out_of_order > 0 {
            tracing::warn!(
                channel = channel.as_str(),
                out_of_order = report.out_of_order,
                "batch was not ascending by created_at; log order is no longer sorted"
            );
        }
        tracing::debug!(
            channel = channel.as_str(),
            appended = report.appended,
            duplicates = report.duplicates_skipped,
            log_len = self.log.len(),
            "merged"
        );
        report
    }
}
