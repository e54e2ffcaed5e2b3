use std::io::{self, Write};

use anyhow::Result;
use serde::Serialize;
use xwall_core::config::{ConfigSource, WallConfig};

use crate::output::{OutputMode, Renderable, pretty_kv, pretty_section, render_item, write_json};

#[derive(Debug, Serialize)]
struct ConfigReport {
    source: String,
    config: WallConfig,
}

impl ConfigReport {
    fn new(config: &WallConfig, source: &ConfigSource) -> Self {
        let source = match source {
            ConfigSource::Explicit(path) => format!("explicit {}", path.display()),
            ConfigSource::Local(path) => format!("local {}", path.display()),
            ConfigSource::User(path) => format!("user {}", path.display()),
            ConfigSource::Defaults => "defaults".to_string(),
        };
        Self {
            source,
            config: config.redacted(),
        }
    }

    fn toml(&self) -> io::Result<String> {
        toml::to_string_pretty(&self.config).map_err(io::Error::other)
    }
}

impl Renderable for ConfigReport {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_section(w, "Effective configuration")?;
        pretty_kv(w, "Source", &self.source)?;
        pretty_kv(
            w,
            "Store",
            self.config.store.url.as_deref().unwrap_or("(not configured)"),
        )?;
        writeln!(w)?;
        write!(w, "{}", self.toml()?)
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        write_json(w, self)
    }

    fn render_text(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "# source: {}", self.source)?;
        write!(w, "{}", self.toml()?)
    }
}

/// Print the effective configuration with the API key masked.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn run_config(config: &WallConfig, source: &ConfigSource, output: OutputMode) -> Result<()> {
    render_item(&ConfigReport::new(config, source), output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::render_item_to;

    #[test]
    fn report_masks_key_in_every_mode() {
        let mut config = WallConfig::default();
        config.store.url = Some("https://p.supabase.co".into());
        config.store.key = Some("secret-anon-key".into());
        let report = ConfigReport::new(&config, &ConfigSource::Defaults);

        for mode in [OutputMode::Pretty, OutputMode::Text, OutputMode::Json] {
            let mut buf = Vec::new();
            render_item_to(&report, mode, &mut buf).expect("render");
            let out = String::from_utf8(buf).expect("utf8");
            assert!(!out.contains("secret-anon-key"), "{mode:?} leaked the key");
            assert!(out.contains("secr…"), "{mode:?} lost the masked key");
        }
    }

    #[test]
    fn text_mode_is_valid_toml_after_comment() {
        let report = ConfigReport::new(&WallConfig::default(), &ConfigSource::Defaults);
        let mut buf = Vec::new();
        report.render_text(&mut buf).expect("render");
        let out = String::from_utf8(buf).expect("utf8");
        assert!(out.starts_with("# source: defaults\n"));
        let parsed: WallConfig = toml::from_str(&out).expect("round trip");
        assert_eq!(parsed.store.table, "posts");
    }
}
