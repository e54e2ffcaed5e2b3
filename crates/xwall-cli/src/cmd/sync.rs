use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use xwall_core::config::WallConfig;
use xwall_core::post::Post;
use xwall_core::store::PostQuery;
use xwall_core::sync::IngestionSync;

use super::{SourceArgs, open_store};
use crate::output::{OutputMode, Renderable, pretty_kv, pretty_section, render_item, write_json};

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// How many of the newest posts to list.
    #[arg(long, default_value_t = 5)]
    pub newest: usize,
}

#[derive(Debug, Serialize)]
struct SyncReport {
    store: String,
    fetched: usize,
    posts: usize,
    duplicates: u64,
    decode_failures: u64,
    out_of_order: u64,
    newest: Vec<Post>,
}

impl Renderable for SyncReport {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_section(w, "Sync")?;
        pretty_kv(w, "Store", &self.store)?;
        pretty_kv(w, "Fetched", self.fetched.to_string())?;
        pretty_kv(w, "Posts", self.posts.to_string())?;
        if self.duplicates > 0 {
            pretty_kv(w, "Duplicates", self.duplicates.to_string())?;
        }
        if self.decode_failures > 0 {
            pretty_kv(w, "Skipped", format!("{} undecodable rows", self.decode_failures))?;
        }
        if self.out_of_order > 0 {
            pretty_kv(w, "Unordered", format!("{} rows out of order", self.out_of_order))?;
        }
        if !self.newest.is_empty() {
            writeln!(w)?;
            pretty_section(w, "Newest")?;
            for post in &self.newest {
                writeln!(
                    w,
                    "{}  {:<20} {}",
                    post.created_at.format("%m-%d %H:%M"),
                    post.handle_label(),
                    post.content.split_whitespace().collect::<Vec<_>>().join(" ")
                )?;
            }
        }
        Ok(())
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        write_json(w, self)
    }

    fn render_text(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "posts={} fetched={} duplicates={} skipped={}",
            self.posts, self.fetched, self.duplicates, self.decode_failures
        )?;
        for post in &self.newest {
            writeln!(
                w,
                "{}\t{}\t{}",
                post.created_at.to_rfc3339(),
                post.source_id,
                post.handle_label()
            )?;
        }
        Ok(())
    }
}

/// One-shot bootstrap: fetch the whole table and report what the wall
/// would start with.
///
/// # Errors
///
/// Returns an error if the store is not configured or the fetch fails.
pub fn run_sync(args: &SyncArgs, config: &WallConfig, output: OutputMode) -> Result<()> {
    let store = open_store(config, args.source.from_file.as_deref())?;
    let rows = store
        .fetch_posts(&PostQuery::all())
        .with_context(|| format!("fetching posts from {}", store.describe()))?;
    let fetched = rows.len();

    let mut sync = IngestionSync::new();
    sync.apply_bootstrap(Ok(rows));
    let stats = sync.stats();

    let report = SyncReport {
        store: store.describe(),
        fetched,
        posts: sync.log().len(),
        duplicates: stats.duplicates,
        decode_failures: stats.decode_failures,
        out_of_order: stats.out_of_order,
        newest: sync.log().newest(args.newest).cloned().collect(),
    };
    render_item(&report, output)?;
    Ok(())
}
