//! The liveness clock.
//!
//! Injected so the watchdog and replay-defense checks can be driven by a
//! fake clock in tests instead of real wall time.

use chrono::{DateTime, Utc};

/// Returns the current instant. Implementations must be cheap to call —
/// the session loop calls `now()` on every message and every watchdog
/// recomputation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The production clock: wall-clock time via `chrono::Utc::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
