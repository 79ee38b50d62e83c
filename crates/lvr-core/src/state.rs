//! Run state machine for one interactive command invocation.

/// Lifecycle state of a run.
///
/// Transitions are driven only by the
/// [`LifecycleController`](crate::controller::LifecycleController):
///
/// ```text
/// Initializing --acquire success--> Active --trigger--> Draining --> Closed
/// Initializing --acquire failure--> Draining (partial cleanup) --> Closed
/// ```
///
/// Re-entering Draining or Closed is a no-op; nothing leaves Draining other
/// than Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Resources are being acquired; no events flow yet.
    Initializing,
    /// All resources acquired; events flow until a termination trigger.
    Active,
    /// Teardown in progress; resources are being released.
    Draining,
    /// Terminal. All releases completed or were abandoned to the watchdog.
    Closed,
}

impl RunState {
    /// `true` once the run can never produce another event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Active => write!(f, "active"),
            Self::Draining => write!(f, "draining"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
