//! A set of message ids with per-entry expiry, used for at-most-once
//! delivery within the dedup window.
//!
//! Owned exclusively by the session loop — no internal locking, matching
//! the single-threaded-cooperative model the rest of the crate follows.

use crate::clock::Clock;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

pub struct TtlSet {
    clock: Arc<dyn Clock>,
    ttl: ChronoDuration,
    entries: HashMap<String, DateTime<Utc>>,
}

impl TtlSet {
    pub fn new(clock: Arc<dyn Clock>, ttl: ChronoDuration) -> Self {
        Self {
            clock,
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Insert `key`. Returns `true` if it was absent (and is now tracked),
    /// `false` if an unexpired entry already existed — in which case this
    /// call has no effect on that entry's expiry.
    pub fn add(&mut self, key: impl Into<String>) -> bool {
        self.sweep();
        let key = key.into();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, self.clock.now());
        true
    }

    /// True iff an unexpired entry for `key` exists.
    pub fn contains(&mut self, key: &str) -> bool {
        self.sweep();
        self.entries.contains_key(key)
    }

    fn sweep(&mut self) {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.entries.retain(|_, inserted_at| now - *inserted_at < ttl);
    }
}
