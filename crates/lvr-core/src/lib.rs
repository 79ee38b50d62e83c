//! Core run lifecycle for liverun (`lvr`).
//!
//! A long-running interactive command has one run: it acquires live
//! resources (a feed subscription, a presence entry, a polling timer),
//! streams events to the user until interrupted, then releases everything
//! it acquired, in reverse order, within a bounded window.
//!
//! This crate owns that orchestration:
//! - [`LifecycleController`] drives the run state machine and guarantees
//!   teardown, including the forced-exit watchdog.
//! - [`ResourceHandle`] wraps one acquired resource behind an idempotent
//!   release capability.
//! - [`EventRouter`] normalizes inbound source events, drops the run's own
//!   echoes and near-duplicate deliveries, and forwards the rest in order.
//! - [`OutputSink`] renders events and the final outcome as either pretty
//!   lines or single-line JSON, decided once per run.
//!
//! The command layer supplies acquisition and rendering; this crate supplies
//! orchestration.

pub mod controller;
pub mod dedup;
pub mod error;
pub mod handle;
pub mod logging;
pub mod router;
pub mod sink;
pub mod state;

pub use controller::{
    DEFAULT_WATCHDOG, LifecycleController, RunConfig, TerminationReason, Trigger,
};
pub use dedup::{DedupeKey, RecencyWindow};
pub use error::{AcquisitionError, DispatchError, ForceExitError, ReleaseError};
pub use handle::{HandleKind, ReleaseFuture, ResourceHandle};
pub use router::{EventCategory, EventRecord, EventRouter, RawEvent};
pub use sink::{OutputMode, OutputSink, RunOutcome, SharedSink};
pub use state::RunState;
