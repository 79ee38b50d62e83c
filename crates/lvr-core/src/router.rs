//! Event routing: normalize inbound source events and forward them to the
//! output sink, in source order, minus self-echoes and near-duplicates.

use crate::dedup::{DedupeKey, RecencyWindow};
use crate::handle::HandleKind;
use crate::sink::SharedSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Category of a normalized event. Drives the pretty-mode marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Enter,
    Leave,
    Update,
    Message,
    Error,
}

impl EventCategory {
    /// Map a raw action string onto a category. Unknown actions render as
    /// plain messages.
    pub fn from_action(action: &str) -> Self {
        match action {
            "enter" => Self::Enter,
            "leave" | "exit" => Self::Leave,
            "update" => Self::Update,
            "error" => Self::Error,
            _ => Self::Message,
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enter => write!(f, "enter"),
            Self::Leave => write!(f, "leave"),
            Self::Update => write!(f, "update"),
            Self::Message => write!(f, "message"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Raw inbound event as delivered by a source, before normalization.
///
/// This is also the wire shape of one feed line; unknown actors and missing
/// timestamps are legal (timer ticks carry neither).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub action: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Normalized event forwarded to the output sink. Ephemeral: produced per
/// inbound event, consumed immediately, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    pub source: HandleKind,
    pub actor: Option<String>,
    pub action: String,
    pub data: Value,
}

/// Routes raw source events to the output sink.
///
/// Two drop policies apply before forwarding, in order:
/// 1. self-filtering: events whose actor matches the run's own identity
///    (a run does not report its own presence actions back to the user);
/// 2. dedupe: a repeated `(actor, action)` within the recency window.
///
/// Everything else is forwarded in the order the source delivered it.
pub struct EventRouter {
    own_actor: Option<String>,
    window: RecencyWindow,
    sink: SharedSink,
}

impl EventRouter {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            own_actor: None,
            window: RecencyWindow::default(),
            sink,
        }
    }

    /// Set the run's own actor identity for self-filtering.
    pub fn with_own_actor(mut self, actor: impl Into<String>) -> Self {
        self.own_actor = Some(actor.into());
        self
    }

    pub fn with_window(mut self, window: RecencyWindow) -> Self {
        self.window = window;
        self
    }

    /// Normalize and forward one event.
    ///
    /// Synchronous and side-effect-only. Dispatch failures are contained:
    /// the event is dropped with a warning and the run continues.
    pub fn on_event(&mut self, source: HandleKind, raw: RawEvent) {
        if self.is_self_originated(&raw) {
            debug!("dropping self-originated {} event", raw.action);
            return;
        }

        if let Some(actor) = &raw.actor {
            let key = DedupeKey::new(actor, &raw.action);
            if self.window.check_and_insert(key) {
                debug!("suppressing duplicate ({}, {})", actor, raw.action);
                return;
            }
        }

        let record = EventRecord {
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
            category: EventCategory::from_action(&raw.action),
            source,
            actor: raw.actor,
            action: raw.action,
            data: raw.data,
        };

        match self.sink.lock() {
            Ok(mut sink) => {
                if let Err(e) = sink.emit(&record) {
                    warn!("dropping event after dispatch failure: {e}");
                }
            }
            Err(_) => warn!("output sink unavailable; event dropped"),
        }
    }

    fn is_self_originated(&self, raw: &RawEvent) -> bool {
        match (&self.own_actor, &raw.actor) {
            (Some(own), Some(actor)) => own == actor,
            _ => false,
        }
    }
}
