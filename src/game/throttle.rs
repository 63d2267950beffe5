//! Keyed throttles used by the engines
//!
//! Both are plain state machines. The leading-edge throttle reads the shared
//! clock; the trailing-edge throttle is driven by the scheduler, which reports
//! window closure back with the window id it was opened with.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

use crate::util::time::SharedClock;

/// Accept the first event per key, drop the rest until the window elapses
pub struct LeadingThrottle<K> {
    clock: SharedClock,
    open_until: HashMap<K, Instant>,
}

impl<K: Eq + Hash> LeadingThrottle<K> {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            open_until: HashMap::new(),
        }
    }

    /// Returns true if the event is accepted; an accepted event opens a new window
    pub fn admit(&mut self, key: K, window: Duration) -> bool {
        let now = self.clock.now();
        match self.open_until.get(&key) {
            Some(until) if now < *until => false,
            _ => {
                self.open_until.insert(key, now + window);
                true
            }
        }
    }

    pub fn forget(&mut self, key: &K) {
        self.open_until.remove(key);
    }
}

struct Window<V> {
    id: u64,
    latest: Option<V>,
}

/// Coalesce values per key and release only the latest when a window closes
pub struct TrailingThrottle<K, V> {
    windows: HashMap<K, Window<V>>,
    next_id: u64,
}

impl<K: Eq + Hash, V> TrailingThrottle<K, V> {
    pub fn new() -> Self {
        Self {
            windows: HashMap::new(),
            next_id: 0,
        }
    }

    /// Record a value. Returns the id of a newly opened window, which the
    /// caller must close later; `None` means the value joined an open window.
    pub fn offer(&mut self, key: K, value: V) -> Option<u64> {
        if let Some(window) = self.windows.get_mut(&key) {
            window.latest = Some(value);
            return None;
        }

        self.next_id += 1;
        let id = self.next_id;
        self.windows.insert(
            key,
            Window {
                id,
                latest: Some(value),
            },
        );
        Some(id)
    }

    /// Close a window, yielding the latest pending value if any
    pub fn close(&mut self, key: &K, window_id: u64) -> Option<V> {
        match self.windows.get(key) {
            Some(window) if window.id == window_id => {
                self.windows.remove(key).and_then(|w| w.latest)
            }
            _ => None,
        }
    }

    /// Drop the pending value but keep the window open
    pub fn discard(&mut self, key: &K) {
        if let Some(window) = self.windows.get_mut(key) {
            window.latest = None;
        }
    }

    /// Drop the window entirely
    pub fn forget(&mut self, key: &K) {
        self.windows.remove(key);
    }

    pub fn is_open(&self, key: &K) -> bool {
        self.windows.contains_key(key)
    }
}

impl<K: Eq + Hash, V> Default for TrailingThrottle<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
