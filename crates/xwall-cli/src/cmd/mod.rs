pub mod completions;
pub mod config;
pub mod run;
pub mod simulate;
pub mod sync;
pub mod tail;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use xwall_core::config::WallConfig;
use xwall_core::playback::{Frame, Tick};
use xwall_core::store::PostStore;
use xwall_core::store::file::FileStore;
use xwall_core::store::supabase::SupabaseStore;
use xwall_core::wall::WallOptions;

use crate::output::{Renderable, pretty_rule, write_json};

/// Where posts come from when not talking to Supabase.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Replay posts from a JSON array or JSON Lines file instead of Supabase.
    #[arg(long, value_name = "PATH")]
    pub from_file: Option<PathBuf>,
}

/// Open the configured store, or a file replay when `from_file` is given.
///
/// # Errors
///
/// Returns the store's `NotConfigured` error when no file is given and the
/// Supabase URL or key is missing.
pub fn open_store(config: &WallConfig, from_file: Option<&Path>) -> Result<Arc<dyn PostStore>> {
    if let Some(path) = from_file {
        return Ok(Arc::new(FileStore::new(path)));
    }
    Ok(Arc::new(SupabaseStore::from_config(&config.store)?))
}

pub fn wall_options(config: &WallConfig, max_frames: Option<u64>) -> WallOptions {
    WallOptions {
        poll_interval: config.sync.poll_interval(),
        max_frames,
        ..WallOptions::default()
    }
}

/// One scheduler tick, as printed by `tail` and `simulate`.
#[derive(Debug, Serialize)]
pub struct TickRecord {
    pub tick: u64,
    pub log_len: usize,
    #[serde(flatten)]
    pub state: TickState,
}

#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TickState {
    Empty,
    Resynced,
    Show { label: String, frame: Box<Frame> },
}

impl TickRecord {
    pub fn new(tick: u64, result: &Tick, log_len: usize) -> Self {
        let state = match result {
            Tick::Empty => TickState::Empty,
            Tick::Resynced => TickState::Resynced,
            Tick::Show(frame) => TickState::Show {
                label: frame.label(),
                frame: Box::new(frame.clone()),
            },
        };
        Self {
            tick,
            log_len,
            state,
        }
    }
}

impl Renderable for TickRecord {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        match &self.state {
            TickState::Empty => writeln!(w, "[tick {}] Waiting for posts...", self.tick),
            TickState::Resynced => writeln!(w, "[tick {}] Playback resynced", self.tick),
            TickState::Show { label, frame } => {
                let post = &frame.post;
                writeln!(
                    w,
                    "[tick {}] {label}{:>width$}",
                    self.tick,
                    format!("#{}", frame.global_index),
                    width = 40usize.saturating_sub(label.chars().count())
                )?;
                writeln!(
                    w,
                    "{} ({}) · {}",
                    post.author_name,
                    post.handle_label(),
                    post.created_at.format("%Y-%m-%d %H:%M")
                )?;
                if !post.content.is_empty() {
                    writeln!(w, "{}", post.content)?;
                }
                if let Some(media) = &post.media_url {
                    writeln!(w, "[media] {media}")?;
                }
                let e = &frame.engagement;
                writeln!(
                    w,
                    "replies {}  retweets {}  likes {}  views {}",
                    e.replies,
                    e.retweets,
                    e.likes,
                    e.views_label()
                )?;
                pretty_rule(w)
            }
        }
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        write_json(w, self)
    }

    fn render_text(&self, w: &mut dyn Write) -> io::Result<()> {
        match &self.state {
            TickState::Empty => writeln!(w, "tick {}\tempty", self.tick),
            TickState::Resynced => writeln!(w, "tick {}\tresynced", self.tick),
            TickState::Show { label, frame } => writeln!(
                w,
                "tick {}\t{label}\t#{}\t{}\t{}",
                self.tick,
                frame.global_index,
                frame.post.handle_label(),
                single_line(&frame.post.content)
            ),
        }
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
