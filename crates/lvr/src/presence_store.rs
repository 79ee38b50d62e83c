//! File-backed presence records for a feed.
//!
//! Each present actor owns one record at `<feed stem>.presence/<actor>.json`
//! stamped with the entering process id. Entering appends an `enter` event
//! to the feed so other followers see it; leaving appends `leave` and
//! removes the record.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use liverun_core::RawEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::feed::append_event;

/// One actor's presence record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub actor: String,
    pub entered_at: DateTime<Utc>,
    pub pid: u32,
    #[serde(default)]
    pub data: Value,
}

/// Directory holding the presence records for `feed`.
pub fn presence_dir(feed: &Path) -> PathBuf {
    feed.with_extension("presence")
}

fn record_path(feed: &Path, actor: &str) -> PathBuf {
    presence_dir(feed).join(format!("{actor}.json"))
}

/// Enter presence as `actor`.
///
/// Fails if a record for `actor` already exists; a crashed run leaves a
/// stale record behind, and clobbering it silently would hide a second
/// live instance of the same identity.
pub fn enter(feed: &Path, actor: &str, data: Value) -> Result<()> {
    let dir = presence_dir(feed);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create presence dir: {}", dir.display()))?;

    let path = record_path(feed, actor);
    if path.exists() {
        bail!(
            "'{actor}' is already present on this feed (remove {} if it is stale)",
            path.display()
        );
    }

    let record = PresenceRecord {
        actor: actor.to_string(),
        entered_at: Utc::now(),
        pid: std::process::id(),
        data: data.clone(),
    };
    let json =
        serde_json::to_string_pretty(&record).context("Failed to serialize presence record")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write presence record: {}", path.display()))?;

    append_event(
        feed,
        &RawEvent {
            actor: Some(actor.to_string()),
            action: "enter".to_string(),
            data,
            timestamp: Some(Utc::now()),
        },
    )?;

    Ok(())
}

/// Leave presence as `actor`: remove the record, then announce the leave.
pub fn leave(feed: &Path, actor: &str) -> Result<()> {
    let path = record_path(feed, actor);
    std::fs::remove_file(&path)
        .with_context(|| format!("Failed to remove presence record: {}", path.display()))?;

    append_event(
        feed,
        &RawEvent {
            actor: Some(actor.to_string()),
            action: "leave".to_string(),
            data: Value::Null,
            timestamp: Some(Utc::now()),
        },
    )?;

    Ok(())
}

/// All current presence records for `feed`. A missing presence directory
/// means nobody is present; corrupt records are skipped with a warning.
pub fn roster(feed: &Path) -> Result<Vec<PresenceRecord>> {
    let dir = presence_dir(feed);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(Vec::new()),
    };

    let mut records = Vec::new();
    for entry in entries {
        let entry = entry.context("Failed to read presence dir entry")?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("skipping unreadable presence record {}: {e}", path.display());
                continue;
            }
        };
        match serde_json::from_str::<PresenceRecord>(&content) {
            Ok(record) => records.push(record),
            Err(e) => warn!("skipping corrupt presence record {}: {e}", path.display()),
        }
    }

    records.sort_by(|a, b| a.actor.cmp(&b.actor));
    Ok(records)
}
