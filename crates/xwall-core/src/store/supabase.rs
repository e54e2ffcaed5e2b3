//! Supabase-backed store: PostgREST for queries, Realtime for inserts.

use std::time::Duration;

use chrono::SecondsFormat;
use tracing::debug;

use super::realtime::{self, RealtimeConfig};
use super::{PostQuery, PostStore, PushSink, Subscription};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::post::RawPost;

pub struct SupabaseStore {
    base_url: String,
    key: String,
    schema: String,
    table: String,
    realtime: bool,
    agent: ureq::Agent,
}

impl SupabaseStore {
    /// Build a store from the `[store]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotConfigured`] when the URL or key is missing.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_url = config
            .url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| StoreError::NotConfigured("store.url / SUPABASE_URL is unset".into()))?;
        let key = config
            .key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| StoreError::NotConfigured("store.key / SUPABASE_KEY is unset".into()))?;

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("xwall/", env!("CARGO_PKG_VERSION")))
            .build();

        Ok(Self {
            base_url,
            key,
            schema: config.schema.clone(),
            table: config.table.clone(),
            realtime: config.realtime,
            agent,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

impl PostStore for SupabaseStore {
    fn fetch_posts(&self, query: &PostQuery) -> Result<Vec<RawPost>, StoreError> {
        let url = self.table_url();
        let mut request = self
            .agent
            .get(&url)
            .set("apikey", &self.key)
            .set("Authorization", &format!("Bearer {}", self.key))
            .set("Accept", "application/json")
            .set("Accept-Profile", &self.schema)
            .query("select", "*")
            .query("order", "created_at.asc,source_id.asc");

        if let Some(after) = query.after {
            let bound = after.to_rfc3339_opts(SecondsFormat::Micros, true);
            request = request.query("created_at", &format!("gt.{bound}"));
        }

        debug!(%url, after = ?query.after, "fetching posts");

        match request.call() {
            Ok(response) => response
                .into_json::<Vec<RawPost>>()
                .map_err(|err| StoreError::Decode(format!("posts response: {err}"))),
            Err(ureq::Error::Status(status, response)) => Err(StoreError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(err) => Err(StoreError::Transport(err.to_string())),
        }
    }

    fn subscribe(&self, sink: PushSink) -> Result<Subscription, StoreError> {
        if !self.realtime {
            return Ok(Subscription::idle());
        }
        let config = RealtimeConfig::new(&self.base_url, &self.key, &self.schema, &self.table)?;
        realtime::spawn(config, sink)
    }

    fn describe(&self) -> String {
        format!("supabase {}/{}.{}", self.base_url, self.schema, self.table)
    }
}
