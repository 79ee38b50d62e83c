//! Follow command: stream a feed's events until interrupted.
//!
//! ```text
//! # Stream new events, human-readable
//! lvr follow events.jsonl
//!
//! # Replay the whole feed first, as JSON lines
//! lvr follow events.jsonl --from-start --json
//!
//! # Hide your own echoes
//! lvr follow events.jsonl --actor alice
//! ```

use anyhow::Result;
use clap::Args;
use liverun_core::{
    EventRouter, LifecycleController, OutputSink, RecencyWindow, RunConfig,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{output_mode, run_until_terminated};
use crate::sources::{SharedRouter, acquire_feed_subscription};

/// Arguments for `lvr follow`
#[derive(Args, Debug)]
pub struct FollowArgs {
    /// Path to the JSONL event feed
    pub feed: PathBuf,

    /// Own actor identity; events from this actor are not printed
    #[arg(long)]
    pub actor: Option<String>,

    /// Replay the existing feed contents before streaming new events
    #[arg(long)]
    pub from_start: bool,

    /// Suppression window for repeated actor actions, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub dedupe_window_ms: u64,

    /// Upper bound on graceful teardown, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub watchdog_ms: u64,

    /// Output events as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Execute the follow command.
pub async fn execute(args: FollowArgs) -> Result<()> {
    let sink = OutputSink::stdout(output_mode(args.json)).shared();

    let config = RunConfig::new().with_watchdog(Duration::from_millis(args.watchdog_ms));
    let mut controller = LifecycleController::new(config, sink.clone());
    let trigger = controller.trigger();

    let mut router = EventRouter::new(sink)
        .with_window(RecencyWindow::new(Duration::from_millis(args.dedupe_window_ms)));
    if let Some(actor) = &args.actor {
        router = router.with_own_actor(actor.clone());
    }
    let router: SharedRouter = Arc::new(Mutex::new(router));

    let feed = args.feed.clone();
    let from_start = args.from_start;
    controller
        .add_resource(move || acquire_feed_subscription(feed, router, trigger, from_start));

    run_until_terminated(controller).await
}
