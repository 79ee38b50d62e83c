//! Presence command: enter a feed as an actor and follow it until
//! interrupted, leaving on the way out.
//!
//! The run acquires two resources, in order: the feed subscription, then
//! the presence entry. If entering fails (already present), the
//! subscription is released again before the error is reported. On
//! teardown the presence entry is released first, so the leave event is
//! announced while the record is already gone.
//!
//! ```text
//! lvr presence events.jsonl --as alice
//! lvr presence events.jsonl --as bot-7 --data '{"role":"monitor"}' --json
//! ```

use anyhow::{Context, Result};
use clap::Args;
use liverun_core::{
    AcquisitionError, EventRouter, HandleKind, LifecycleController, OutputSink, RecencyWindow,
    ReleaseError, ResourceHandle, RunConfig,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{output_mode, run_until_terminated};
use crate::presence_store;
use crate::sources::{SharedRouter, acquire_feed_subscription};

/// Arguments for `lvr presence`
#[derive(Args, Debug)]
pub struct PresenceArgs {
    /// Path to the JSONL event feed
    pub feed: PathBuf,

    /// Actor identity to enter presence as
    #[arg(long = "as", value_name = "ACTOR")]
    pub actor: String,

    /// JSON payload attached to the presence entry
    #[arg(long)]
    pub data: Option<String>,

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

/// Execute the presence command.
pub async fn execute(args: PresenceArgs) -> Result<()> {
    let data: Value = match &args.data {
        Some(raw) => serde_json::from_str(raw).context("--data must be valid JSON")?,
        None => Value::Null,
    };

    let sink = OutputSink::stdout(output_mode(args.json)).shared();

    let config = RunConfig::new().with_watchdog(Duration::from_millis(args.watchdog_ms));
    let mut controller = LifecycleController::new(config, sink.clone());
    let trigger = controller.trigger();

    // Own echoes (our enter/leave coming back through the watcher) are
    // filtered out by identity.
    let router = EventRouter::new(sink)
        .with_own_actor(args.actor.clone())
        .with_window(RecencyWindow::new(Duration::from_millis(args.dedupe_window_ms)));
    let router: SharedRouter = Arc::new(Mutex::new(router));

    let feed = args.feed.clone();
    controller.add_resource(move || acquire_feed_subscription(feed, router, trigger, false));

    let feed = args.feed.clone();
    let actor = args.actor.clone();
    controller.add_resource(move || acquire_presence_entry(feed, actor, data));

    run_until_terminated(controller).await
}

async fn acquire_presence_entry(
    feed: PathBuf,
    actor: String,
    data: Value,
) -> Result<ResourceHandle, AcquisitionError> {
    presence_store::enter(&feed, &actor, data).map_err(|e| {
        AcquisitionError::with_source(
            HandleKind::Presence,
            actor.clone(),
            "could not enter presence",
            e,
        )
    })?;

    let label = actor.clone();
    Ok(ResourceHandle::new(HandleKind::Presence, label, move || {
        Box::pin(async move {
            presence_store::leave(&feed, &actor).map_err(|e| {
                ReleaseError::with_source(
                    HandleKind::Presence,
                    actor.clone(),
                    "could not leave presence",
                    e,
                )
            })
        })
    }))
}
