//! # Clock Module
//!
//! Uptime and wall-clock time for stamping records.
//!
//! A freshly booted board has no RTC battery and reports 1970 until NTP has
//! synced, so wall time below `MIN_VALID_YEAR` is treated as unknown.

use std::time::Instant;

use chrono::{DateTime, Datelike, Utc};

/// Earliest year accepted as a synced wall clock
pub const MIN_VALID_YEAR: i32 = 2016;

/// Time source consumed by the sync controller
pub trait Clock: Send {
    /// Seconds since process start
    fn up_time(&self) -> u32;

    /// Current wall-clock time, or `None` if it is not yet trustworthy
    fn now(&self) -> Option<DateTime<Utc>>;
}

/// System clock backed by `Instant` and the OS wall clock
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
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
    fn up_time(&self) -> u32 {
        u32::try_from(self.started.elapsed().as_secs()).unwrap_or(u32::MAX)
    }

    fn now(&self) -> Option<DateTime<Utc>> {
        plausible(Utc::now())
    }
}

/// Returns `time` only if it is past `MIN_VALID_YEAR`
pub fn plausible(time: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (time.year() >= MIN_VALID_YEAR).then_some(time)
}
