//! Feed subscription source: file watching bridged onto the run's event loop.

use liverun_core::{AcquisitionError, EventRouter, HandleKind, ResourceHandle, Trigger};
use notify::{RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::feed::FeedCursor;

/// Router shared between the acquisition task and the command.
pub type SharedRouter = Arc<Mutex<EventRouter>>;

/// How often the blocking watcher loop re-checks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Subscribe to a feed: watch the file for appended events and dispatch
/// them through the router.
///
/// Two tasks back the returned handle. A blocking task drains the `notify`
/// watcher and reads new feed lines; an async task receives the parsed
/// events and dispatches them on the run's event loop, preserving feed
/// order. Releasing the handle stops both.
///
/// The watcher channel disconnecting mid-run is unrecoverable and fires the
/// fatal trigger.
pub async fn acquire_feed_subscription(
    feed: PathBuf,
    router: SharedRouter,
    trigger: Trigger,
    from_start: bool,
) -> Result<ResourceHandle, AcquisitionError> {
    let label = feed.display().to_string();

    if !feed.is_file() {
        return Err(AcquisitionError::new(
            HandleKind::Subscription,
            label,
            "feed file does not exist",
        ));
    }

    let mut cursor = if from_start {
        FeedCursor::from_start(&feed)
    } else {
        FeedCursor::tail(&feed)
    };

    // Replay the existing contents before streaming new events.
    if from_start {
        let events = cursor.poll().map_err(|e| {
            AcquisitionError::with_source(
                HandleKind::Subscription,
                label.clone(),
                "failed to replay feed",
                e,
            )
        })?;
        if let Ok(mut router) = router.lock() {
            for event in events {
                router.on_event(HandleKind::Subscription, event);
            }
        }
    }

    let (fs_tx, fs_rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let _ = fs_tx.send(event);
        }
    })
    .map_err(|e| {
        AcquisitionError::with_source(
            HandleKind::Subscription,
            label.clone(),
            "failed to create file watcher",
            e,
        )
    })?;

    // Watch the containing directory: rotation replaces the file itself.
    let watch_root = match feed.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    watcher.watch(&watch_root, RecursiveMode::NonRecursive).map_err(|e| {
        AcquisitionError::with_source(
            HandleKind::Subscription,
            label.clone(),
            "failed to watch feed directory",
            e,
        )
    })?;

    let stop = trigger.token().child_token();
    let (raw_tx, mut raw_rx) = tokio::sync::mpsc::channel(256);

    // Blocking side: wait for file system events on the feed, read new lines.
    let feed_name = feed.file_name().map(|n| n.to_os_string());
    let stop_reader = stop.clone();
    let trigger_reader = trigger.clone();
    let reader_task = tokio::task::spawn_blocking(move || {
        // Keep the watcher alive for the lifetime of the loop.
        let _watcher = watcher;
        loop {
            if stop_reader.is_cancelled() {
                debug!("feed reader cancelled");
                break;
            }
            match fs_rx.recv_timeout(CANCEL_POLL) {
                Ok(event) => {
                    let relevant = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == feed_name);
                    if !relevant {
                        continue;
                    }
                    match cursor.poll() {
                        Ok(events) => {
                            for event in events {
                                if raw_tx.blocking_send(event).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => warn!("feed read failed: {e}"),
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    trigger_reader.fatal("feed watcher disconnected");
                    break;
                }
            }
        }
    });

    // Async side: dispatch on the run's event loop, in feed order.
    let stop_dispatch = stop.clone();
    let dispatch_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                received = raw_rx.recv() => match received {
                    Some(event) => match router.lock() {
                        Ok(mut router) => router.on_event(HandleKind::Subscription, event),
                        Err(_) => warn!("router unavailable; event dropped"),
                    },
                    None => break,
                },
                _ = stop_dispatch.cancelled() => break,
            }
        }
    });

    Ok(ResourceHandle::new(
        HandleKind::Subscription,
        feed.display().to_string(),
        move || {
            Box::pin(async move {
                stop.cancel();
                if let Err(e) = reader_task.await {
                    warn!("feed reader task failed: {e}");
                }
                if let Err(e) = dispatch_task.await {
                    warn!("feed dispatch task failed: {e}");
                }
                Ok(())
            })
        },
    ))
}
