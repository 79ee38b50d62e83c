//! Output sinks: the single JSON-vs-pretty fork for a run.
//!
//! The mode is decided once at startup from the command's `--json` flag and
//! never changes; a run never mixes both renderings for the same event.

use crate::error::DispatchError;
use crate::router::{EventCategory, EventRecord};
use crossterm::style::Stylize;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// How a run renders events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Colorized human-readable lines.
    Pretty,
    /// One structured JSON object per line.
    Json,
}

/// Shared handle to the run's single output sink.
///
/// Shared between the router (event records) and the controller (terminal
/// outcome). Only ever locked briefly from the run's event loop.
pub type SharedSink = Arc<Mutex<OutputSink>>;

/// Final result of a run, rendered by [`OutputSink::emit_terminal`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub reason: String,
    /// Handles whose release was attempted (including failed releases).
    pub released: usize,
    /// `true` when the drain watchdog expired and teardown was abandoned.
    pub forced: bool,
}

/// Renders event records and the terminal outcome for one run.
pub struct OutputSink {
    mode: OutputMode,
    out: Box<dyn Write + Send>,
}

impl OutputSink {
    pub fn new(mode: OutputMode, out: Box<dyn Write + Send>) -> Self {
        Self { mode, out }
    }

    /// Sink writing to the process stdout.
    pub fn stdout(mode: OutputMode) -> Self {
        Self::new(mode, Box::new(std::io::stdout()))
    }

    pub fn shared(self) -> SharedSink {
        Arc::new(Mutex::new(self))
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Render one event record as a single output line.
    pub fn emit(&mut self, record: &EventRecord) -> Result<(), DispatchError> {
        match self.mode {
            OutputMode::Json => {
                let line = serde_json::json!({
                    "success": record.category != EventCategory::Error,
                    "timestamp": record.timestamp.to_rfc3339(),
                    "category": record.category,
                    "source": record.source,
                    "actor": &record.actor,
                    "action": &record.action,
                    "data": &record.data,
                });
                writeln!(self.out, "{line}")?;
            }
            OutputMode::Pretty => {
                writeln!(self.out, "{}", render_pretty(record))?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    /// Render the final run summary once the controller reaches Closed.
    pub fn emit_terminal(&mut self, outcome: &RunOutcome) -> Result<(), DispatchError> {
        match self.mode {
            OutputMode::Json => {
                let line = serde_json::to_string(outcome)?;
                writeln!(self.out, "{line}")?;
            }
            OutputMode::Pretty => {
                if outcome.forced {
                    writeln!(
                        self.out,
                        "{} force exiting: drain did not complete within the watchdog ({}; released {})",
                        "✗".red(),
                        outcome.reason,
                        outcome.released,
                    )?;
                } else {
                    writeln!(
                        self.out,
                        "{} closed ({}); released {} resource handle(s)",
                        "✓".green(),
                        outcome.reason,
                        outcome.released,
                    )?;
                }
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

fn render_pretty(record: &EventRecord) -> String {
    let marker = match record.category {
        EventCategory::Enter => "→".green(),
        EventCategory::Leave => "←".yellow(),
        EventCategory::Update => "~".cyan(),
        EventCategory::Message => "•".blue(),
        EventCategory::Error => "✗".red(),
    };

    let mut line = format!("{} {marker}", record.timestamp.format("%H:%M:%S%.3f"));
    if let Some(actor) = &record.actor {
        line.push_str(&format!(" {}", actor.as_str().bold()));
    }
    line.push_str(&format!(" {}", record.action));
    if !is_empty_payload(&record.data) {
        line.push_str(&format!(" {}", record.data));
    }
    line
}

fn is_empty_payload(data: &serde_json::Value) -> bool {
    match data {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
