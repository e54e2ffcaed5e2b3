//! Read-only store backed by a local export file.
//!
//! The file is either a JSON array of rows (what the PostgREST endpoint
//! returns) or JSON Lines with one row per line. It is re-read on every
//! fetch, so appending lines to it while the wall runs behaves like new
//! inserts picked up by the catch-up poll. There is no push channel.

use std::path::{Path, PathBuf};

use super::memory::select_rows;
use super::{PostQuery, PostStore, PushSink, Subscription};
use crate::error::StoreError;
use crate::post::RawPost;

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse every row in the file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] if the file cannot be read and
    /// [`StoreError::Decode`] if it is neither a JSON array nor JSON Lines.
    pub fn read_rows(&self) -> Result<Vec<RawPost>, StoreError> {
        let content = std::fs::read_to_string(&self.path).map_err(|err| {
            StoreError::Transport(format!("failed to read {}: {err}", self.path.display()))
        })?;
        parse_rows(&content)
            .map_err(|err| StoreError::Decode(format!("{}: {err}", self.path.display())))
    }
}

impl PostStore for FileStore {
    fn fetch_posts(&self, query: &PostQuery) -> Result<Vec<RawPost>, StoreError> {
        let rows = self.read_rows()?;
        Ok(select_rows(rows, query))
    }

    fn subscribe(&self, _sink: PushSink) -> Result<Subscription, StoreError> {
        Ok(Subscription::idle())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

fn parse_rows(content: &str) -> Result<Vec<RawPost>, serde_json::Error> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed);
    }

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .map(serde_json::from_str)
        .collect()
}
