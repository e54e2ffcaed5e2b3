use anyhow::Result;
use clap::Args;
use xwall_core::config::WallConfig;
use xwall_core::wall::{Flow, Wall, WallView};

use super::{SourceArgs, TickRecord, open_store, wall_options};
use crate::output::{OutputMode, render_item};

#[derive(Args, Debug)]
pub struct TailArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Stop after this many displayed posts.
    #[arg(long, value_name = "N")]
    pub frames: Option<u64>,
}

/// Run the live wall headless, printing every tick as it happens.
///
/// # Errors
///
/// Returns an error if the store is not configured or output fails.
pub fn run_tail(args: &TailArgs, config: &WallConfig, output: OutputMode) -> Result<()> {
    let store = open_store(config, args.source.from_file.as_deref())?;
    let mut wall = Wall::new(store, wall_options(config, args.frames));

    let mut tick = 0_u64;
    let mut surface = |view: &WallView<'_>| -> Result<Flow> {
        if view.fresh {
            tick += 1;
            render_item(&TickRecord::new(tick, view.tick, view.log_len), output)?;
        }
        Ok(Flow::Continue)
    };
    let summary = wall.run(&mut surface)?;

    tracing::info!(
        frames = summary.frames,
        log_len = summary.log_len,
        polls = summary.stats.polls,
        pushes = summary.stats.pushes,
        "tail finished"
    );
    Ok(())
}
