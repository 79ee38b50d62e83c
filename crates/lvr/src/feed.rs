//! JSONL event feed reading and appending.
//!
//! A feed is a plain append-only file with one JSON event per line:
//!
//! ```text
//! {"actor":"abc","action":"enter","data":{},"timestamp":"2026-03-01T12:00:00Z"}
//! ```
//!
//! `actor`, `data`, and `timestamp` are optional. Readers track a byte
//! offset and only consume complete lines, so a writer mid-append is never
//! observed half-way.

use anyhow::{Context, Result};
use liverun_core::RawEvent;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Incremental reader over a JSONL feed file.
pub struct FeedCursor {
    path: PathBuf,
    pos: u64,
}

impl FeedCursor {
    /// Cursor positioned after the current end of the feed, so only events
    /// appended from now on are returned (like `tail -f`).
    pub fn tail(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let pos = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self { path, pos }
    }

    /// Cursor positioned at the start of the feed (replays existing events).
    pub fn from_start(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pos: 0,
        }
    }

    /// Read newly appended complete lines and parse them as events.
    ///
    /// Corrupt lines are skipped with a warning. If the feed shrank
    /// (truncation or rotation) the cursor restarts from the beginning.
    /// A transiently missing file yields no events rather than an error.
    pub fn poll(&mut self) -> Result<Vec<RawEvent>> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(_) => return Ok(Vec::new()),
        };
        if metadata.len() < self.pos {
            self.pos = 0;
        }

        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open feed: {}", self.path.display()))?;
        file.seek(SeekFrom::Start(self.pos))
            .context("Failed to seek feed")?;

        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut line = String::new();

        loop {
            let bytes = reader.read_line(&mut line).context("Failed to read feed")?;
            if bytes == 0 {
                break;
            }
            if !line.ends_with('\n') {
                // Partial write; pick it up on the next poll.
                break;
            }
            self.pos += bytes as u64;

            let trimmed = line.trim();
            if !trimmed.is_empty() {
                match serde_json::from_str::<RawEvent>(trimmed) {
                    Ok(event) => events.push(event),
                    Err(e) => warn!("skipping corrupt feed line: {e}"),
                }
            }
            line.clear();
        }

        Ok(events)
    }
}

/// Append one event to the feed as a single line.
pub fn append_event(path: &Path, event: &RawEvent) -> Result<()> {
    let mut line = serde_json::to_string(event).context("Failed to serialize feed event")?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("Failed to open feed for append: {}", path.display()))?;
    file.write_all(line.as_bytes())
        .context("Failed to append to feed")?;
    file.flush().context("Failed to flush feed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn event(actor: &str, action: &str) -> RawEvent {
        RawEvent {
            actor: Some(actor.to_string()),
            action: action.to_string(),
            data: serde_json::Value::Null,
            timestamp: None,
        }
    }

    #[test]
    fn tail_skips_existing_events() {
        let dir = TempDir::new().unwrap();
        let feed = dir.path().join("events.jsonl");
        append_event(&feed, &event("a", "enter")).unwrap();

        let mut cursor = FeedCursor::tail(&feed);
        assert!(cursor.poll().unwrap().is_empty());

        append_event(&feed, &event("b", "enter")).unwrap();
        let events = cursor.poll().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor.as_deref(), Some("b"));
    }

    #[test]
    fn from_start_replays_everything() {
        let dir = TempDir::new().unwrap();
        let feed = dir.path().join("events.jsonl");
        append_event(&feed, &event("a", "enter")).unwrap();
        append_event(&feed, &event("a", "leave")).unwrap();

        let mut cursor = FeedCursor::from_start(&feed);
        let events = cursor.poll().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "enter");
        assert_eq!(events[1].action, "leave");

        // Nothing new on the next poll.
        assert!(cursor.poll().unwrap().is_empty());
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let feed = dir.path().join("events.jsonl");
        append_event(&feed, &event("a", "enter")).unwrap();
        fs::write(
            &feed,
            format!(
                "{}not-json\n{}\n",
                fs::read_to_string(&feed).unwrap(),
                serde_json::to_string(&event("b", "enter")).unwrap()
            ),
        )
        .unwrap();

        let mut cursor = FeedCursor::from_start(&feed);
        let events = cursor.poll().unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn truncation_resets_to_start() {
        let dir = TempDir::new().unwrap();
        let feed = dir.path().join("events.jsonl");
        append_event(&feed, &event("a", "enter")).unwrap();
        append_event(&feed, &event("b", "enter")).unwrap();

        let mut cursor = FeedCursor::from_start(&feed);
        assert_eq!(cursor.poll().unwrap().len(), 2);

        // Rotate: replace the feed with a shorter file.
        fs::write(&feed, "").unwrap();
        append_event(&feed, &event("c", "enter")).unwrap();

        let events = cursor.poll().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor.as_deref(), Some("c"));
    }

    #[test]
    fn partial_line_is_deferred_until_complete() {
        let dir = TempDir::new().unwrap();
        let feed = dir.path().join("events.jsonl");
        let full = serde_json::to_string(&event("a", "enter")).unwrap();
        let (head, rest) = full.split_at(10);
        fs::write(&feed, head).unwrap();

        let mut cursor = FeedCursor::from_start(&feed);
        assert!(cursor.poll().unwrap().is_empty());

        fs::write(&feed, format!("{head}{rest}\n")).unwrap();
        assert_eq!(cursor.poll().unwrap().len(), 1);
    }

    #[test]
    fn missing_file_yields_no_events() {
        let dir = TempDir::new().unwrap();
        let mut cursor = FeedCursor::tail(dir.path().join("absent.jsonl"));
        assert!(cursor.poll().unwrap().is_empty());
    }
}
