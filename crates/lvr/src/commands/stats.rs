//! Stats command: poll a feed on a timer and stream cumulative totals.

use anyhow::Result;
use clap::Args;
use liverun_core::{
    AcquisitionError, EventCategory, EventRouter, HandleKind, LifecycleController, OutputSink,
    RawEvent, ResourceHandle, RunConfig,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

use super::{output_mode, run_until_terminated};
use crate::feed::FeedCursor;
use crate::presence_store;
use crate::sources::SharedRouter;

/// Arguments for `lvr stats`
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Path to the JSONL event feed
    pub feed: PathBuf,

    /// Poll interval, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub interval_ms: u64,

    /// Upper bound on graceful teardown, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub watchdog_ms: u64,

    /// Output stats as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Execute the stats command.
pub async fn execute(args: StatsArgs) -> Result<()> {
    let sink = OutputSink::stdout(output_mode(args.json)).shared();

    let config = RunConfig::new().with_watchdog(Duration::from_millis(args.watchdog_ms));
    let mut controller = LifecycleController::new(config, sink.clone());
    let trigger = controller.trigger();

    let router: SharedRouter = Arc::new(Mutex::new(EventRouter::new(sink)));

    let feed = args.feed.clone();
    let every = Duration::from_millis(args.interval_ms);
    controller.add_resource(move || acquire_stats_timer(feed, router, trigger, every));

    run_until_terminated(controller).await
}

/// Start the polling timer. Each tick reads newly appended events, folds
/// them into the running totals, and dispatches one `update` event with
/// the snapshot. The first tick fires immediately.
async fn acquire_stats_timer(
    feed: PathBuf,
    router: SharedRouter,
    trigger: liverun_core::Trigger,
    every: Duration,
) -> Result<ResourceHandle, AcquisitionError> {
    let label = format!("stats:{}", feed.display());

    if !feed.is_file() {
        return Err(AcquisitionError::new(
            HandleKind::Timer,
            label,
            "feed file does not exist",
        ));
    }

    let stop = trigger.token().child_token();
    let stop_task = stop.clone();
    let mut cursor = FeedCursor::from_start(&feed);
    let mut totals = FeedTotals::default();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match cursor.poll() {
                        Ok(events) => {
                            for event in &events {
                                totals.absorb(event);
                            }
                        }
                        Err(e) => warn!("stats poll failed: {e}"),
                    }
                    let present = presence_store::roster(&feed)
                        .map(|r| r.len())
                        .unwrap_or(0);
                    let tick = RawEvent {
                        actor: None,
                        action: "update".to_string(),
                        data: totals.snapshot(present),
                        timestamp: None,
                    };
                    match router.lock() {
                        Ok(mut router) => router.on_event(HandleKind::Timer, tick),
                        Err(_) => warn!("router unavailable; stats tick dropped"),
                    }
                }
                _ = stop_task.cancelled() => break,
            }
        }
    });

    Ok(ResourceHandle::new(HandleKind::Timer, label, move || {
        Box::pin(async move {
            stop.cancel();
            if let Err(e) = task.await {
                warn!("stats task failed: {e}");
            }
            Ok(())
        })
    }))
}

/// Cumulative per-category event totals for one feed.
#[derive(Debug, Default)]
struct FeedTotals {
    total: u64,
    enter: u64,
    leave: u64,
    update: u64,
    message: u64,
    error: u64,
}

impl FeedTotals {
    fn absorb(&mut self, event: &RawEvent) {
        self.total += 1;
        match EventCategory::from_action(&event.action) {
            EventCategory::Enter => self.enter += 1,
            EventCategory::Leave => self.leave += 1,
            EventCategory::Update => self.update += 1,
            EventCategory::Message => self.message += 1,
            EventCategory::Error => self.error += 1,
        }
    }

    fn snapshot(&self, present: usize) -> serde_json::Value {
        serde_json::json!({
            "total": self.total,
            "present": present,
            "enter": self.enter,
            "leave": self.leave,
            "update": self.update,
            "message": self.message,
            "error": self.error,
        })
    }
}
