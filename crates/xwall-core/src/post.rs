//! Post records as displayed on the wall, and the raw rows they decode from.
//!
//! The store delivers loosely-typed rows ([`RawPost`]); every field may be
//! missing. [`Post::from_raw`] applies the display defaults and rejects rows
//! that cannot be ordered or deduplicated.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

const DEFAULT_AUTHOR_NAME: &str = "Unknown";
const DEFAULT_AUTHOR_HANDLE: &str = "unknown";

/// A row of the remote `posts` table as delivered by a query or a push event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    /// Database identity. Integer or UUID depending on the table.
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_handle: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// An ingested post. Immutable once it is in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Stable external identity, the deduplication key.
    pub source_id: String,
    /// Local identity; equals `source_id` when the row has no `id`.
    pub display_id: String,
    pub author_name: String,
    /// Handle without the leading `@`.
    pub author_handle: String,
    pub avatar_url: String,
    pub content: String,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Build a post with default author fields and empty content.
    #[must_use]
    pub fn new(source_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let source_id = source_id.into();
        Self {
            display_id: source_id.clone(),
            source_id,
            author_name: DEFAULT_AUTHOR_NAME.to_string(),
            author_handle: DEFAULT_AUTHOR_HANDLE.to_string(),
            avatar_url: String::new(),
            content: String::new(),
            media_url: None,
            created_at,
        }
    }

    #[must_use]
    pub fn with_author(mut self, name: impl Into<String>, handle: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_handle = normalize_handle(&handle.into());
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Decode a raw store row, applying display defaults.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] when the row has no `created_at`, an
    /// unparseable `created_at`, or neither `source_id` nor `id`.
    pub fn from_raw(raw: RawPost) -> Result<Self, StoreError> {
        let display_id = raw.id.as_ref().and_then(id_to_string);
        let source_id = non_empty(raw.source_id)
            .or_else(|| display_id.clone())
            .ok_or_else(|| StoreError::Decode("row has neither source_id nor id".into()))?;

        let created_at = raw
            .created_at
            .as_deref()
            .ok_or_else(|| StoreError::Decode(format!("row {source_id} has no created_at")))
            .and_then(parse_timestamp)?;

        Ok(Self {
            display_id: display_id.unwrap_or_else(|| source_id.clone()),
            author_name: non_empty(raw.author_name)
                .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string()),
            author_handle: non_empty(raw.author_handle)
                .map_or_else(|| DEFAULT_AUTHOR_HANDLE.to_string(), |h| normalize_handle(&h)),
            avatar_url: raw.avatar_url.unwrap_or_default(),
            content: raw.content.unwrap_or_default(),
            media_url: non_empty(raw.media_url),
            created_at,
            source_id,
        })
    }

    /// Handle as rendered on the card, e.g. `@replit`.
    #[must_use]
    pub fn handle_label(&self) -> String {
        format!("@{}", self.author_handle)
    }

    /// First character of the author name, used when no avatar is drawn.
    #[must_use]
    pub fn initial(&self) -> char {
        self.author_name.chars().next().unwrap_or('?')
    }
}

/// Parse a `created_at` value as emitted by PostgREST or Realtime.
///
/// Accepts RFC 3339 (`2024-05-01T10:00:00.5+00:00`), the Postgres text form
/// (`2024-05-01 10:00:00.5+00`), and offset-less timestamps, which are read
/// as UTC.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] if no supported format matches.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(trimmed, format) {
            return Ok(ts.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(StoreError::Decode(format!("unrecognized created_at: {trimmed}")))
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn raw(value: Value) -> RawPost {
        serde_json::from_value(value).expect("raw post should deserialize")
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let post = Post::from_raw(raw(json!({
            "source_id": "https://x.com/a/status/1",
            "created_at": "2024-05-01T10:00:00+00:00"
        })))
        .expect("decode");

        assert_eq!(post.author_name, "Unknown");
        assert_eq!(post.handle_label(), "@unknown");
        assert_eq!(post.avatar_url, "");
        assert_eq!(post.content, "");
        assert_eq!(post.media_url, None);
        assert_eq!(post.display_id, "https://x.com/a/status/1");
    }

    #[test]
    fn numeric_id_becomes_display_id() {
        let post = Post::from_raw(raw(json!({
            "id": 42,
            "source_id": "tw-9",
            "author_handle": "replit",
            "created_at": "2024-05-01T10:00:00Z"
        })))
        .expect("decode");

        assert_eq!(post.display_id, "42");
        assert_eq!(post.source_id, "tw-9");
        assert_eq!(post.handle_label(), "@replit");
    }

    #[test]
    fn id_stands_in_for_missing_source_id() {
        let post = Post::from_raw(raw(json!({
            "id": "b7c1",
            "created_at": "2024-05-01T10:00:00Z"
        })))
        .expect("decode");
        assert_eq!(post.source_id, "b7c1");
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let post = Post::from_raw(raw(json!({
            "source_id": "s1",
            "author_name": "",
            "author_handle": "@@dev",
            "media_url": "",
            "created_at": "2024-05-01T10:00:00Z"
        })))
        .expect("decode");
        assert_eq!(post.author_name, "Unknown");
        assert_eq!(post.handle_label(), "@dev");
        assert_eq!(post.media_url, None);
    }

    #[test]
    fn rows_without_created_at_are_rejected() {
        let err = Post::from_raw(raw(json!({ "source_id": "s1" }))).expect_err("must fail");
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn rows_without_identity_are_rejected() {
        let err = Post::from_raw(raw(json!({ "created_at": "2024-05-01T10:00:00Z" })))
            .expect_err("must fail");
        assert!(err.to_string().contains("neither source_id nor id"));
    }

    #[test]
    fn unknown_columns_are_ignored() {
        let post = Post::from_raw(raw(json!({
            "source_id": "s1",
            "platform": "twitter",
            "status": "PENDING",
            "created_at": "2024-05-01T10:00:00Z"
        })));
        assert!(post.is_ok());
    }

    #[test]
    fn postgres_text_timestamps_parse() {
        let expected = Utc
            .with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
            .single()
            .expect("valid date");

        for input in [
            "2024-05-01T10:00:00Z",
            "2024-05-01T10:00:00+00:00",
            "2024-05-01 10:00:00+00",
            "2024-05-01 15:30:00+05:30",
            "2024-05-01 10:00:00",
        ] {
            let parsed = parse_timestamp(input).expect(input);
            assert_eq!(parsed, expected, "input {input}");
        }
    }

    #[test]
    fn garbage_timestamps_fail() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn initial_falls_back_for_empty_name() {
        let mut post = Post::new("s", Utc::now());
        assert_eq!(post.initial(), 'U');
        post.author_name.clear();
        assert_eq!(post.initial(), '?');
    }
}
