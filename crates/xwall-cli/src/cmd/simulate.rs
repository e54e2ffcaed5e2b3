//! Offline playback on virtual time: every tick is computed immediately.

use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use xwall_core::playback::Scheduler;
use xwall_core::store::file::FileStore;
use xwall_core::store::{PostQuery, PostStore};
use xwall_core::sync::IngestionSync;

use super::TickRecord;
use crate::output::{OutputMode, render_item};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// JSON array or JSON Lines file with the posts to play.
    #[arg(long, value_name = "PATH")]
    pub from_file: PathBuf,

    /// Number of ticks to run.
    #[arg(long, default_value_t = 20)]
    pub ticks: u64,

    /// Withhold the newest K posts from the initial load and deliver them
    /// later as pushes.
    #[arg(long, value_name = "K", default_value_t = 0)]
    pub hold_back: usize,

    /// Deliver one withheld post after every M ticks.
    #[arg(
        long,
        value_name = "M",
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub arrive_every: u64,
}

/// Run the scheduler against a file without waiting between ticks.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or output fails.
pub fn run_simulate(args: &SimulateArgs, output: OutputMode) -> Result<()> {
    let store = FileStore::new(&args.from_file);
    let mut rows = store
        .fetch_posts(&PostQuery::all())
        .with_context(|| format!("loading {}", args.from_file.display()))?;

    let held_from = rows.len().saturating_sub(args.hold_back);
    let mut held: VecDeque<_> = rows.split_off(held_from).into();

    let mut sync = IngestionSync::new();
    sync.apply_bootstrap(Ok(rows));
    let mut scheduler = Scheduler::default();

    tracing::debug!(
        initial = sync.log().len(),
        held = held.len(),
        ticks = args.ticks,
        "simulating"
    );

    for tick in 1..=args.ticks {
        let result = scheduler.tick(sync.posts());
        render_item(&TickRecord::new(tick, &result, sync.log().len()), output)?;

        let arrival = if tick % args.arrive_every == 0 {
            held.pop_front()
        } else {
            None
        };
        if let Some(row) = arrival {
            sync.apply_push(row);
        }
    }
    Ok(())
}
