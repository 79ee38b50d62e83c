//! Error taxonomy for run lifecycle operations.
//!
//! Propagation policy: acquisition failures are fatal and go to the command
//! layer for user-facing reporting. Release and dispatch failures are
//! contained and only logged; the controller's primary duty is clean
//! shutdown, not completeness of every individual operation. The one fatal
//! condition during teardown itself is the watchdog expiring.

use crate::handle::HandleKind;
use std::time::Duration;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// A required resource could not be established.
///
/// Fatal: surfaced immediately, never retried by this crate. Retry policy
/// belongs to whatever is being acquired.
#[derive(Debug, thiserror::Error)]
#[error("failed to acquire {kind} '{label}': {message}")]
pub struct AcquisitionError {
    pub kind: HandleKind,
    pub label: String,
    pub message: String,
    #[source]
    pub source: Option<BoxedSource>,
}

impl AcquisitionError {
    pub fn new(kind: HandleKind, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: HandleKind,
        label: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self {
            kind,
            label: label.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// A release operation failed during drain.
///
/// Non-fatal: logged per handle, does not block the remaining releases.
#[derive(Debug, thiserror::Error)]
#[error("failed to release {kind} '{label}': {message}")]
pub struct ReleaseError {
    pub kind: HandleKind,
    pub label: String,
    pub message: String,
    #[source]
    pub source: Option<BoxedSource>,
}

impl ReleaseError {
    pub fn new(kind: HandleKind, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: HandleKind,
        label: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self {
            kind,
            label: label.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Drain did not complete within the watchdog window.
///
/// Any release still in flight is abandoned; the process exits with a
/// non-zero status.
#[derive(Debug, thiserror::Error)]
#[error("drain exceeded the {watchdog:?} watchdog with {pending} release(s) still pending")]
pub struct ForceExitError {
    pub watchdog: Duration,
    pub pending: usize,
}

/// The router or sink failed while processing one event.
///
/// Isolated to that single event: caught, logged, and the run continues.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to write event output: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}
