//! Resource handles: acquired live resources with a single-shot release.

use crate::error::ReleaseError;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// What kind of live resource a handle wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    /// A channel/feed subscription delivering inbound events.
    Subscription,
    /// A presence entry that must be left on the way out.
    Presence,
    /// A polling timer.
    Timer,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscription => write!(f, "subscription"),
            Self::Presence => write!(f, "presence"),
            Self::Timer => write!(f, "timer"),
        }
    }
}

/// Future returned by a release callback.
pub type ReleaseFuture = Pin<Box<dyn Future<Output = Result<(), ReleaseError>> + Send>>;

type ReleaseFn = Box<dyn FnOnce() -> ReleaseFuture + Send>;

/// One acquired live resource.
///
/// The release capability is exclusively owned and taken on the first
/// [`release`](Self::release) call; second and later calls are no-ops. The
/// controller releases each handle exactly once in the happy path; the
/// no-op behaviour is the safety net for the forced-exit path.
pub struct ResourceHandle {
    kind: HandleKind,
    label: String,
    acquired_at: DateTime<Utc>,
    release: Option<ReleaseFn>,
}

impl ResourceHandle {
    /// Wrap a successful acquisition. `release` performs the actual
    /// unsubscribe/leave/stop and is invoked at most once.
    pub fn new<F>(kind: HandleKind, label: impl Into<String>, release: F) -> Self
    where
        F: FnOnce() -> ReleaseFuture + Send + 'static,
    {
        Self {
            kind,
            label: label.into(),
            acquired_at: Utc::now(),
            release: Some(Box::new(release)),
        }
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// `true` once the release capability has been consumed.
    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    /// Release the underlying resource.
    ///
    /// Safe to call more than once; only the first call does anything.
    pub async fn release(&mut self) -> Result<(), ReleaseError> {
        match self.release.take() {
            Some(release) => release().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("acquired_at", &self.acquired_at)
            .field("released", &self.is_released())
            .finish()
    }
}
