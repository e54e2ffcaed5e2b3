use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agenda::AgendaRow;

pub const LOCAL_CONFIG_FILE: &str = "xwall.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WallConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub agenda: Vec<AgendaRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_true")]
    pub realtime: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            table: default_table(),
            schema: default_schema(),
            realtime: default_true(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl SyncConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub tag_line: Option<String>,
    /// Offset of the venue's wall clock from UTC, used for the agenda.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            tag_line: None,
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Local(PathBuf),
    User(PathBuf),
    Defaults,
}

/// Parse a config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_config_file(path: &Path) -> Result<WallConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<WallConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Find the config file to use, without reading it.
///
/// An explicit path wins, then `./xwall.toml` under `working_dir`, then
/// `<config_dir>/xwall/config.toml`.
#[must_use]
pub fn locate_config(explicit: Option<&Path>, working_dir: &Path) -> ConfigSource {
    if let Some(path) = explicit {
        return ConfigSource::Explicit(path.to_path_buf());
    }

    let local = working_dir.join(LOCAL_CONFIG_FILE);
    if local.exists() {
        return ConfigSource::Local(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let user = config_dir.join("xwall/config.toml");
        if user.exists() {
            return ConfigSource::User(user);
        }
    }

    ConfigSource::Defaults
}

/// Load the effective configuration: file (if any), then environment
/// overrides (`SUPABASE_URL`, `SUPABASE_KEY`, `XWALL_TABLE`).
///
/// # Errors
///
/// Returns an error if an explicit or discovered file cannot be parsed.
pub fn resolve_config(
    explicit: Option<&Path>,
    working_dir: &Path,
) -> Result<(WallConfig, ConfigSource)> {
    let source = locate_config(explicit, working_dir);
    let mut config = match &source {
        ConfigSource::Explicit(path) | ConfigSource::Local(path) | ConfigSource::User(path) => {
            load_config_file(path)?
        }
        ConfigSource::Defaults => WallConfig::default(),
    };

    apply_env_overrides(
        &mut config,
        env::var("SUPABASE_URL").ok(),
        env::var("SUPABASE_KEY").ok(),
        env::var("XWALL_TABLE").ok(),
    );

    Ok((config, source))
}

fn apply_env_overrides(
    config: &mut WallConfig,
    url: Option<String>,
    key: Option<String>,
    table: Option<String>,
) {
    if let Some(url) = url.filter(|v| !v.trim().is_empty()) {
        config.store.url = Some(url);
    }
    if let Some(key) = key.filter(|v| !v.trim().is_empty()) {
        config.store.key = Some(key);
    }
    if let Some(table) = table.filter(|v| !v.trim().is_empty()) {
        config.store.table = table;
    }
}

impl WallConfig {
    /// Copy of the config safe to print: the API key is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(key) = copy.store.key.as_mut() {
            let visible: String = key.chars().take(4).collect();
            *key = format!("{visible}…");
        }
        copy
    }
}

const fn default_true() -> bool {
    true
}

fn default_table() -> String {
    "posts".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_poll_interval_secs() -> u64 {
    30
}

fn default_title() -> String {
    "Live from the floor".to_string()
}

const fn default_utc_offset_minutes() -> i32 {
    330
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = locate_config(None, dir.path());
        // A user-level config may exist on the machine running the tests.
        assert!(matches!(source, ConfigSource::Defaults | ConfigSource::User(_)));

        let cfg = WallConfig::default();
        assert_eq!(cfg.store.table, "posts");
        assert_eq!(cfg.store.schema, "public");
        assert!(cfg.store.realtime);
        assert_eq!(cfg.sync.poll_interval(), Duration::from_secs(30));
        assert_eq!(cfg.display.utc_offset_minutes, 330);
        assert!(cfg.agenda.is_empty());
    }

    #[test]
    fn local_file_beats_user_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let local = dir.path().join(LOCAL_CONFIG_FILE);
        std::fs::write(&local, "").expect("write");
        assert_eq!(locate_config(None, dir.path()), ConfigSource::Local(local));
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join(LOCAL_CONFIG_FILE), "").expect("write");
        let explicit = dir.path().join("other.toml");
        assert_eq!(
            locate_config(Some(&explicit), dir.path()),
            ConfigSource::Explicit(explicit)
        );
    }

    #[test]
    fn parses_full_config() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("wall.toml");
        std::fs::write(
            &path,
            r#"
[store]
url = "https://proj.supabase.co"
key = "anon-key"
table = "xwall"
realtime = false

[sync]
poll_interval_secs = 5

[display]
title = "DevFest"
tag_line = "Tag @gdg on X to get featured"
utc_offset_minutes = 60

[[agenda]]
time = "09:30"
title = "Registration"

[[agenda]]
time = "10:30"
title = "Keynote"
speaker = "A. Speaker"
"#,
        )
        .expect("write");

        let cfg = load_config_file(&path).expect("parse");
        assert_eq!(cfg.store.url.as_deref(), Some("https://proj.supabase.co"));
        assert_eq!(cfg.store.table, "xwall");
        assert_eq!(cfg.store.schema, "public");
        assert!(!cfg.store.realtime);
        assert_eq!(cfg.sync.poll_interval_secs, 5);
        assert_eq!(cfg.display.title, "DevFest");
        assert_eq!(cfg.agenda.len(), 2);
        assert_eq!(cfg.agenda[1].speaker.as_deref(), Some("A. Speaker"));
    }

    #[test]
    fn malformed_config_reports_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[store\nurl = ").expect("write");
        let err = load_config_file(&path).expect_err("must fail");
        assert!(format!("{err:#}").contains("bad.toml"));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut cfg = WallConfig::default();
        cfg.store.url = Some("https://file.example".into());
        apply_env_overrides(
            &mut cfg,
            Some("https://env.example".into()),
            Some("env-key".into()),
            Some(String::new()),
        );
        assert_eq!(cfg.store.url.as_deref(), Some("https://env.example"));
        assert_eq!(cfg.store.key.as_deref(), Some("env-key"));
        assert_eq!(cfg.store.table, "posts");
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let cfg = SyncConfig {
            poll_interval_secs: 0,
        };
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn redacted_masks_key() {
        let mut cfg = WallConfig::default();
        cfg.store.key = Some("abcdefghij".into());
        assert_eq!(cfg.redacted().store.key.as_deref(), Some("abcd…"));
        assert_eq!(cfg.store.key.as_deref(), Some("abcdefghij"));
    }
}
