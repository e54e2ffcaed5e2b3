use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use xwall_core::config::WallConfig;
use xwall_core::wall::Wall;

use super::{SourceArgs, open_store, wall_options};
use crate::tui::wall::{ScreenModel, WallScreen};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Where log output goes while the wall owns the terminal.
    #[arg(long, value_name = "PATH", default_value = "xwall.log")]
    pub log_file: PathBuf,
}

/// Full-screen wall until `q`, `Esc` or `Ctrl-C`.
///
/// # Errors
///
/// Returns an error if the store is not configured or the terminal cannot
/// be set up.
pub fn run_wall(args: &RunArgs, config: &WallConfig) -> Result<()> {
    let store = open_store(config, args.source.from_file.as_deref())?;
    let model = ScreenModel {
        display: config.display.clone(),
        agenda: config.agenda.clone(),
        store: store.describe(),
    };
    let mut wall = Wall::new(store, wall_options(config, None));

    let mut screen = WallScreen::enter(model).context("setting up the terminal")?;
    let outcome = wall.run(&mut screen);
    screen.leave().context("restoring the terminal")?;

    let summary = outcome?;
    tracing::info!(
        frames = summary.frames,
        log_len = summary.log_len,
        "wall closed"
    );
    Ok(())
}
