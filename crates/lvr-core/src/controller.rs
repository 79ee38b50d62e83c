//! Lifecycle controller: orchestrates acquisition, event flow, and
//! guaranteed teardown for one long-running interactive command invocation.
//!
//! The command layer registers acquisition callbacks and render callbacks
//! (via the sink); the controller owns everything else: the run state
//! machine, the one termination trigger source per run, and the
//! watchdog-bounded reverse-order release of every acquired handle.

use crate::error::{AcquisitionError, ForceExitError};
use crate::handle::ResourceHandle;
use crate::sink::{RunOutcome, SharedSink};
use crate::state::RunState;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default drain watchdog.
pub const DEFAULT_WATCHDOG: Duration = Duration::from_millis(5000);

/// Why a run left the Active state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// SIGINT/SIGTERM (Ctrl-C on non-Unix platforms).
    Interrupted,
    /// A source or the router surfaced an unrecoverable error.
    Fatal(String),
    /// Explicit programmatic stop.
    Stopped,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupted => write!(f, "interrupted"),
            Self::Fatal(message) => write!(f, "fatal error: {message}"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Cloneable termination trigger handed to sources and the command layer.
///
/// The first trigger wins; later triggers (including a second signal racing
/// the first) are no-ops.
#[derive(Debug, Clone)]
pub struct Trigger {
    cancel: CancellationToken,
    reason: Arc<OnceLock<TerminationReason>>,
}

impl Trigger {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Request an orderly stop.
    pub fn stop(&self) {
        self.fire(TerminationReason::Stopped);
    }

    /// Report an unrecoverable error and request termination.
    pub fn fatal(&self, message: impl Into<String>) {
        self.fire(TerminationReason::Fatal(message.into()));
    }

    fn interrupt(&self) {
        self.fire(TerminationReason::Interrupted);
    }

    fn fire(&self, reason: TerminationReason) {
        if self.reason.set(reason).is_err() {
            debug!("duplicate termination trigger ignored");
        }
        self.cancel.cancel();
    }

    /// Token for sources that stop themselves on termination. Child tokens
    /// of this one let a release cancel its own source early.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn current_reason(&self) -> Option<TerminationReason> {
        self.reason.get().cloned()
    }
}

/// Configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Upper bound on the whole drain; past it, teardown is abandoned.
    pub watchdog: Duration,
    /// Install SIGINT/SIGTERM handling on `start`. Off when embedding the
    /// controller somewhere that owns its own signals (tests, daemons).
    pub install_signals: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            watchdog: DEFAULT_WATCHDOG,
            install_signals: true,
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn without_signal_handlers(mut self) -> Self {
        self.install_signals = false;
        self
    }
}

type AcquireFuture = Pin<Box<dyn Future<Output = Result<ResourceHandle, AcquisitionError>> + Send>>;
type Acquirer = Box<dyn FnOnce() -> AcquireFuture + Send>;

/// Orchestrates one interactive run: acquire, stream, drain, close.
pub struct LifecycleController {
    state: RunState,
    config: RunConfig,
    sink: SharedSink,
    trigger: Trigger,
    acquirers: Vec<Acquirer>,
    handles: Vec<ResourceHandle>,
    signals_installed: bool,
}

impl LifecycleController {
    pub fn new(config: RunConfig, sink: SharedSink) -> Self {
        Self {
            state: RunState::Initializing,
            config,
            sink,
            trigger: Trigger::new(),
            acquirers: Vec::new(),
            handles: Vec::new(),
            signals_installed: false,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The run's termination trigger, for sources and the command layer.
    pub fn trigger(&self) -> Trigger {
        self.trigger.clone()
    }

    /// Register a resource to acquire during [`start`](Self::start).
    ///
    /// Acquisition runs in registration order; release runs in reverse.
    pub fn add_resource<F, Fut>(&mut self, acquire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<ResourceHandle, AcquisitionError>> + Send + 'static,
    {
        self.acquirers.push(Box::new(move || Box::pin(acquire())));
    }

    /// Acquire all registered resources and transition to Active.
    ///
    /// Acquirers run sequentially. On the first failure the already-acquired
    /// handles are released (reverse order, bounded by the watchdog), the
    /// run ends Closed, and the error propagates. Acquisition failures are
    /// never retried here.
    pub async fn start(&mut self) -> Result<(), AcquisitionError> {
        if self.state != RunState::Initializing {
            warn!("start called in state {}; ignoring", self.state);
            return Ok(());
        }

        let acquirers: Vec<Acquirer> = self.acquirers.drain(..).collect();
        for acquire in acquirers {
            match acquire().await {
                Ok(handle) => {
                    info!("acquired {} '{}'", handle.kind(), handle.label());
                    self.handles.push(handle);
                }
                Err(e) => {
                    warn!("acquisition failed: {e}; releasing {} handle(s)", self.handles.len());
                    self.state = RunState::Draining;
                    if let Err(force) = self.release_all().await {
                        warn!("cleanup after failed acquisition incomplete: {force}");
                    }
                    self.state = RunState::Closed;
                    return Err(e);
                }
            }
        }

        if self.config.install_signals && !self.signals_installed {
            install_signal_trigger(self.trigger.clone());
            self.signals_installed = true;
        }

        self.state = RunState::Active;
        info!("run active with {} resource handle(s)", self.handles.len());
        Ok(())
    }

    /// Suspend until a termination trigger fires.
    ///
    /// This is the run's single suspension point. Triggers: an OS
    /// termination signal, [`Trigger::fatal`], or [`Trigger::stop`].
    pub async fn await_termination(&self) -> TerminationReason {
        self.trigger.cancel.cancelled().await;
        self.trigger
            .current_reason()
            .unwrap_or(TerminationReason::Stopped)
    }

    /// Release every acquired handle in reverse-acquisition order and close
    /// the run.
    ///
    /// Idempotent: re-entering while Draining or Closed is a no-op, so a
    /// duplicate trigger cannot release anything twice. A single release
    /// failure is logged and does not stop the remaining releases. If the
    /// whole drain exceeds the watchdog, the remaining releases are
    /// abandoned, the forced outcome is reported through the sink, and
    /// [`ForceExitError`] is returned for the caller to turn into a
    /// non-zero exit.
    pub async fn drain(&mut self) -> Result<(), ForceExitError> {
        if matches!(self.state, RunState::Draining | RunState::Closed) {
            debug!("drain re-entered in state {}; ignoring", self.state);
            return Ok(());
        }

        self.state = RunState::Draining;
        let total = self.handles.len();
        let result = self.release_all().await;
        self.state = RunState::Closed;

        let reason = self
            .trigger
            .current_reason()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "completed".to_string());

        match result {
            Ok(released) => {
                self.emit_terminal(RunOutcome {
                    success: true,
                    reason,
                    released,
                    forced: false,
                });
                Ok(())
            }
            Err(force) => {
                self.emit_terminal(RunOutcome {
                    success: false,
                    reason,
                    released: total - force.pending,
                    forced: true,
                });
                Err(force)
            }
        }
    }

    /// Release handles newest-first under the watchdog. Returns the number
    /// of release attempts that ran (failed ones included).
    async fn release_all(&mut self) -> Result<usize, ForceExitError> {
        let mut handles: Vec<ResourceHandle> = self.handles.drain(..).collect();
        let total = handles.len();
        if total == 0 {
            return Ok(0);
        }

        // The counter outlives the timed-out future, so an abandoned drain
        // still reports how far it got.
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();

        let drain_all = async move {
            while let Some(mut handle) = handles.pop() {
                let kind = handle.kind();
                let label = handle.label().to_string();
                match handle.release().await {
                    Ok(()) => info!("released {kind} '{label}'"),
                    Err(e) => warn!("{e}"),
                }
                counter.fetch_add(1, Ordering::SeqCst);
            }
        };

        match timeout(self.config.watchdog, drain_all).await {
            Ok(()) => Ok(released.load(Ordering::SeqCst)),
            Err(_) => {
                let done = released.load(Ordering::SeqCst);
                warn!(
                    "drain watchdog expired after {:?} ({done} of {total} released)",
                    self.config.watchdog
                );
                Err(ForceExitError {
                    watchdog: self.config.watchdog,
                    pending: total - done,
                })
            }
        }
    }

    fn emit_terminal(&self, outcome: RunOutcome) {
        match self.sink.lock() {
            Ok(mut sink) => {
                if let Err(e) = sink.emit_terminal(&outcome) {
                    warn!("failed to emit terminal outcome: {e}");
                }
            }
            Err(_) => warn!("output sink unavailable; terminal outcome dropped"),
        }
    }
}

/// Install SIGINT/SIGTERM handling for one run. The first signal fires the
/// trigger; the state-machine guard in `drain` makes any further signals
/// no-ops.
fn install_signal_trigger(trigger: Trigger) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT"),
                        _ = sigterm.recv() => info!("received SIGTERM"),
                    }
                }
                Err(e) => {
                    warn!("failed to install SIGTERM handler: {e}");
                    let _ = ctrl_c.await;
                    info!("received SIGINT");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C");
        }

        trigger.interrupt();
    });
}
