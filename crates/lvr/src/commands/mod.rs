//! CLI command dispatch and execution

use anyhow::Result;
use clap::{Parser, Subcommand};
use liverun_core::{LifecycleController, OutputMode};
use tracing::info;

mod follow;
mod presence;
mod stats;

/// lvr - lifecycle-managed client for live JSONL event feeds
#[derive(Parser, Debug)]
#[command(
    name = "lvr",
    version,
    about = "Follow live event feeds, enter presence, and stream stats",
    long_about = "Every subcommand is one interactive run: acquire live resources, \
                  stream events until Ctrl-C, then release everything in reverse \
                  order under a teardown watchdog."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow a feed and print its events as they arrive
    Follow(follow::FollowArgs),

    /// Enter presence on a feed and follow its presence events
    Presence(presence::PresenceArgs),

    /// Poll a feed and stream cumulative statistics
    Stats(stats::StatsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Follow(args) => follow::execute(args).await,
            Commands::Presence(args) => presence::execute(args).await,
            Commands::Stats(args) => stats::execute(args).await,
        }
    }
}

pub(crate) fn output_mode(json: bool) -> OutputMode {
    if json { OutputMode::Json } else { OutputMode::Pretty }
}

/// Shared tail of every command: go active, wait for a trigger, drain.
///
/// A drain that outlives the watchdog has already reported the forced
/// outcome through the sink; all that is left is the non-zero exit.
pub(crate) async fn run_until_terminated(mut controller: LifecycleController) -> Result<()> {
    controller.start().await?;
    let reason = controller.await_termination().await;
    info!("terminating: {reason}");
    if controller.drain().await.is_err() {
        std::process::exit(1);
    }
    Ok(())
}
