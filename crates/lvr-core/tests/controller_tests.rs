//! Integration tests for the run lifecycle controller.

use liverun_core::{
    AcquisitionError, HandleKind, LifecycleController, OutputMode, OutputSink, ReleaseError,
    ResourceHandle, RunConfig, RunState, SharedSink, TerminationReason,
};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Write target capturing sink output for assertions.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn json_sink(buf: &SharedBuf) -> SharedSink {
    OutputSink::new(OutputMode::Json, Box::new(buf.clone())).shared()
}

fn test_config() -> RunConfig {
    RunConfig::new().without_signal_handlers()
}

type EventLog = Arc<Mutex<Vec<String>>>;

/// Handle whose release appends `release:<label>` to the shared log.
fn recording_handle(kind: HandleKind, label: &str, events: EventLog) -> ResourceHandle {
    let tag = format!("release:{label}");
    ResourceHandle::new(kind, label, move || {
        Box::pin(async move {
            events.lock().unwrap().push(tag);
            Ok(())
        })
    })
}

/// Handle whose release records, then fails.
fn failing_handle(label: &str, events: EventLog) -> ResourceHandle {
    let tag = format!("release:{label}");
    let owned = label.to_string();
    ResourceHandle::new(HandleKind::Presence, label, move || {
        Box::pin(async move {
            events.lock().unwrap().push(tag);
            Err(ReleaseError::new(HandleKind::Presence, owned, "simulated"))
        })
    })
}

/// Handle whose release never finishes within any reasonable watchdog.
fn stuck_handle(label: &str) -> ResourceHandle {
    ResourceHandle::new(HandleKind::Subscription, label, || {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
    })
}

#[tokio::test]
async fn handles_release_in_reverse_acquisition_order() {
    let buf = SharedBuf::default();
    let mut controller = LifecycleController::new(test_config(), json_sink(&buf));
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));

    for (kind, label) in [
        (HandleKind::Subscription, "feed"),
        (HandleKind::Presence, "me"),
        (HandleKind::Timer, "stats"),
    ] {
        let events = events.clone();
        controller.add_resource(move || async move { Ok(recording_handle(kind, label, events)) });
    }

    assert_eq!(controller.state(), RunState::Initializing);
    controller.start().await.unwrap();
    assert_eq!(controller.state(), RunState::Active);

    controller.drain().await.unwrap();
    assert_eq!(controller.state(), RunState::Closed);

    let log = events.lock().unwrap().clone();
    assert_eq!(log, vec!["release:stats", "release:me", "release:feed"]);
}

#[tokio::test]
async fn failed_acquisition_releases_prior_handles_exactly_once() {
    let buf = SharedBuf::default();
    let mut controller = LifecycleController::new(test_config(), json_sink(&buf));
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));

    let first = events.clone();
    controller.add_resource(move || async move {
        Ok(recording_handle(HandleKind::Subscription, "feed", first))
    });
    controller.add_resource(|| async {
        Err(AcquisitionError::new(
            HandleKind::Presence,
            "me",
            "already present",
        ))
    });

    let err = controller.start().await.unwrap_err();
    assert_eq!(err.kind, HandleKind::Presence);
    assert_eq!(controller.state(), RunState::Closed);

    let log = events.lock().unwrap().clone();
    assert_eq!(log, vec!["release:feed"]);
}

#[tokio::test]
async fn drain_is_idempotent() {
    let buf = SharedBuf::default();
    let mut controller = LifecycleController::new(test_config(), json_sink(&buf));
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));

    let e = events.clone();
    controller
        .add_resource(move || async move { Ok(recording_handle(HandleKind::Timer, "tick", e)) });

    controller.start().await.unwrap();
    controller.drain().await.unwrap();
    // A duplicate trigger would call drain again; nothing may release twice.
    controller.drain().await.unwrap();

    assert_eq!(events.lock().unwrap().len(), 1);
    assert_eq!(controller.state(), RunState::Closed);
}

#[tokio::test]
async fn duplicate_triggers_keep_the_first_reason() {
    let buf = SharedBuf::default();
    let controller = LifecycleController::new(test_config(), json_sink(&buf));
    let trigger = controller.trigger();

    trigger.stop();
    trigger.fatal("too late");
    trigger.stop();

    let reason = controller.await_termination().await;
    assert_eq!(reason, TerminationReason::Stopped);
}

#[tokio::test]
async fn await_termination_resolves_on_programmatic_stop() {
    let buf = SharedBuf::default();
    let mut controller = LifecycleController::new(test_config(), json_sink(&buf));
    controller.start().await.unwrap();

    let trigger = controller.trigger();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.stop();
    });

    let reason = controller.await_termination().await;
    assert_eq!(reason, TerminationReason::Stopped);
    controller.drain().await.unwrap();
}

#[tokio::test]
async fn fatal_reason_carries_the_message() {
    let buf = SharedBuf::default();
    let controller = LifecycleController::new(test_config(), json_sink(&buf));

    controller.trigger().fatal("feed watcher disconnected");

    match controller.await_termination().await {
        TerminationReason::Fatal(message) => {
            assert_eq!(message, "feed watcher disconnected");
        }
        other => panic!("expected fatal, got {other:?}"),
    }
}

#[tokio::test]
async fn release_failure_does_not_block_later_releases() {
    let buf = SharedBuf::default();
    let mut controller = LifecycleController::new(test_config(), json_sink(&buf));
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));

    let first = events.clone();
    controller.add_resource(move || async move {
        Ok(recording_handle(HandleKind::Subscription, "feed", first))
    });
    let second = events.clone();
    controller.add_resource(move || async move { Ok(failing_handle("me", second)) });

    controller.start().await.unwrap();
    // The failing release (drained first) must not stop the other one.
    controller.drain().await.unwrap();

    let log = events.lock().unwrap().clone();
    assert_eq!(log, vec!["release:me", "release:feed"]);
}

#[tokio::test]
async fn watchdog_expiry_forces_exit_and_still_closes() {
    let buf = SharedBuf::default();
    let config = test_config().with_watchdog(Duration::from_millis(100));
    let mut controller = LifecycleController::new(config, json_sink(&buf));
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));

    // Acquired first, released second: never reached before the watchdog.
    let e = events.clone();
    controller.add_resource(move || async move {
        Ok(recording_handle(HandleKind::Presence, "me", e))
    });
    controller.add_resource(|| async { Ok(stuck_handle("feed")) });

    controller.start().await.unwrap();
    controller.trigger().stop();
    controller.await_termination().await;

    let err = controller.drain().await.unwrap_err();
    assert_eq!(err.pending, 2);
    assert_eq!(controller.state(), RunState::Closed);

    // The stuck release was abandoned; the presence handle was never reached.
    assert!(events.lock().unwrap().is_empty());

    // The forced outcome went through the sink.
    let out = buf.contents();
    let last: serde_json::Value = serde_json::from_str(out.lines().last().unwrap()).unwrap();
    assert_eq!(last["forced"], true);
    assert_eq!(last["success"], false);
}

#[tokio::test]
async fn quick_releases_complete_before_the_watchdog_abandons_the_stuck_one() {
    let buf = SharedBuf::default();
    let config = test_config().with_watchdog(Duration::from_millis(200));
    let mut controller = LifecycleController::new(config, json_sink(&buf));
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));

    controller.add_resource(|| async { Ok(stuck_handle("feed")) });
    let e = events.clone();
    controller
        .add_resource(move || async move { Ok(recording_handle(HandleKind::Timer, "stats", e)) });

    controller.start().await.unwrap();
    controller.trigger().stop();
    controller.await_termination().await;

    let err = controller.drain().await.unwrap_err();
    // The timer (released first) completed; only the feed release is pending.
    assert_eq!(err.pending, 1);
    assert_eq!(events.lock().unwrap().clone(), vec!["release:stats"]);

    let out = buf.contents();
    let last: serde_json::Value = serde_json::from_str(out.lines().last().unwrap()).unwrap();
    assert_eq!(last["released"], 1);
}

#[tokio::test]
async fn terminal_outcome_reports_reason_and_count() {
    let buf = SharedBuf::default();
    let mut controller = LifecycleController::new(test_config(), json_sink(&buf));
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));

    let e = events.clone();
    controller
        .add_resource(move || async move { Ok(recording_handle(HandleKind::Timer, "tick", e)) });

    controller.start().await.unwrap();
    controller.trigger().stop();
    controller.await_termination().await;
    controller.drain().await.unwrap();

    let out = buf.contents();
    let outcome: serde_json::Value = serde_json::from_str(out.lines().last().unwrap()).unwrap();
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["reason"], "stopped");
    assert_eq!(outcome["released"], 1);
    assert_eq!(outcome["forced"], false);
}

#[tokio::test]
async fn start_with_no_resources_goes_active() {
    let buf = SharedBuf::default();
    let mut controller = LifecycleController::new(test_config(), json_sink(&buf));

    controller.start().await.unwrap();
    assert_eq!(controller.state(), RunState::Active);
    controller.drain().await.unwrap();
    assert_eq!(controller.state(), RunState::Closed);
}
