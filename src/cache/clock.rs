//! Time source for cache expiry.
//!
//! Engines read the current time through [`Clock`] so expiry can be exercised
//! deterministically with [`ManualClock`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

use time::OffsetDateTime;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::clock";

/// Source of wall-clock timestamps for cache entries.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// UTC time read once at construction and advanced by a monotonic
/// [`Instant`]. Wall-clock steps after that neither age nor revive entries.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor: OffsetDateTime,
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor: OffsetDateTime::now_utc(),
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        self.anchor + self.started.elapsed()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the current UTC time.
    pub fn starting_now() -> Self {
        Self::new(OffsetDateTime::now_utc())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = mutex_lock(&self.now, SOURCE, "advance");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *mutex_lock(&self.now, SOURCE, "now")
    }
}
