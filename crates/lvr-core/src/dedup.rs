//! Recency map for suppressing near-duplicate event deliveries.
//!
//! Presence-style sources can redeliver the same actor action in quick
//! succession. The router keys each event by `(actor, action)` and drops
//! repeats that arrive within the suppression window of the last emitted
//! occurrence. Entries expire after the window and the map is capacity
//! bounded, oldest evicted first.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Default suppression window when none is configured.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);
/// Default max tracked keys.
const DEFAULT_CAPACITY: usize = 1000;

/// Composite key identifying a repeatable actor action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    pub actor: String,
    pub action: String,
}

impl DedupeKey {
    pub fn new(actor: &str, action: &str) -> Self {
        Self {
            actor: actor.to_string(),
            action: action.to_string(),
        }
    }
}

/// Bounded in-memory recency map with a fixed suppression window.
#[derive(Debug)]
pub struct RecencyWindow {
    entries: HashMap<DedupeKey, Instant>,
    order: VecDeque<DedupeKey>,
    window: Duration,
    capacity: usize,
}

impl RecencyWindow {
    pub fn new(window: Duration) -> Self {
        Self::with_capacity(window, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(window: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            window,
            capacity,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` when `key` was already seen within the window.
    ///
    /// A fresh key is recorded (and persists for one window); a duplicate
    /// leaves the original entry untouched, so the window is measured from
    /// the last *emitted* occurrence, not the last attempt.
    pub fn check_and_insert(&mut self, key: DedupeKey) -> bool {
        self.check_and_insert_at(key, Instant::now())
    }

    fn check_and_insert_at(&mut self, key: DedupeKey, now: Instant) -> bool {
        self.purge_expired(now);
        if self.entries.contains_key(&key) {
            return true;
        }
        self.entries.insert(key.clone(), now);
        self.order.push_back(key);
        self.evict_to_capacity();
        false
    }

    fn purge_expired(&mut self, now: Instant) {
        while let Some(front_key) = self.order.front().cloned() {
            let expired = self
                .entries
                .get(&front_key)
                .map(|ts| now.saturating_duration_since(*ts) >= self.window)
                .unwrap_or(true);
            if !expired {
                break;
            }
            self.order.pop_front();
            self.entries.remove(&front_key);
        }
    }

    fn evict_to_capacity(&mut self) {
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for RecencyWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(actor: &str, action: &str) -> DedupeKey {
        DedupeKey::new(actor, action)
    }

    #[test]
    fn insert_then_duplicate() {
        let mut w = RecencyWindow::with_capacity(Duration::from_millis(500), 16);
        assert!(!w.check_and_insert(key("abc", "enter")));
        assert!(w.check_and_insert(key("abc", "enter")));
    }

    #[test]
    fn repeat_outside_window_is_not_duplicate() {
        let mut w = RecencyWindow::with_capacity(Duration::from_millis(500), 16);
        let t0 = Instant::now();
        let k = key("abc", "enter");
        assert!(!w.check_and_insert_at(k.clone(), t0));
        // 100ms later: suppressed.
        assert!(w.check_and_insert_at(k.clone(), t0 + Duration::from_millis(100)));
        // 600ms after the emitted occurrence: emitted again.
        assert!(!w.check_and_insert_at(k, t0 + Duration::from_millis(600)));
    }

    #[test]
    fn duplicate_does_not_refresh_window() {
        let mut w = RecencyWindow::with_capacity(Duration::from_millis(500), 16);
        let t0 = Instant::now();
        let k = key("abc", "enter");
        assert!(!w.check_and_insert_at(k.clone(), t0));
        assert!(w.check_and_insert_at(k.clone(), t0 + Duration::from_millis(400)));
        // 550ms after t0: the original entry expired even though a duplicate
        // arrived at 400ms.
        assert!(!w.check_and_insert_at(k, t0 + Duration::from_millis(550)));
    }

    #[test]
    fn keys_isolated_by_actor_and_action() {
        let mut w = RecencyWindow::with_capacity(Duration::from_millis(500), 16);
        assert!(!w.check_and_insert(key("abc", "enter")));
        assert!(!w.check_and_insert(key("xyz", "enter")));
        assert!(!w.check_and_insert(key("abc", "leave")));
    }

    #[test]
    fn capacity_eviction_discards_oldest() {
        let mut w = RecencyWindow::with_capacity(Duration::from_secs(600), 2);
        assert!(!w.check_and_insert(key("a", "enter")));
        assert!(!w.check_and_insert(key("b", "enter")));
        assert!(!w.check_and_insert(key("c", "enter"))); // evicts ("a", "enter")
        assert!(!w.check_and_insert(key("a", "enter"))); // no longer a duplicate
        assert_eq!(w.len(), 2);
    }
}
