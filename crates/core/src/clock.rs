//! Clock — injected so constraint windows, cooldowns, and epochs are
//! testable without real time.
//!
//! Unique id generation lives on the id newtypes themselves
//! (`SessionId::new()` and friends, UUIDv4-backed).

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::RwLock;

/// A source of "now". Production uses [`SystemClock`]; tests use
/// [`ManualClock`] to step time deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests.
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Advance the clock by whole seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.write().expect("clock lock poisoned");
        *now += TimeDelta::seconds(secs);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write().expect("clock lock poisoned") = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().expect("clock lock poisoned")
    }
}
