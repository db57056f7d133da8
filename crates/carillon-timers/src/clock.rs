//! Time sources and bucket rounding.
//!
//! The store reads wall-clock seconds through the [`TimeSource`] seam so
//! due-time arithmetic stays testable; production stores use
//! [`SystemClock`].

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::constants::RESOLUTION_SECS;

/// Supplier of the current time in whole seconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
    /// Current time, seconds since the epoch.
    fn now_unix(&self) -> i64;
}

/// [`TimeSource`] backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs() as i64
    }
}

/// Manually driven [`TimeSource`] for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: i64) -> Self {
        Self { now: AtomicI64::new(now) }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::Relaxed);
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }
}

impl TimeSource for ManualClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }
}

/// Round `val` up to the next bucket boundary.
pub fn round_up(val: i64) -> i64 {
    let q = val / RESOLUTION_SECS;
    let r = val % RESOLUTION_SECS;
    if r > 0 { (q + 1) * RESOLUTION_SECS } else { q * RESOLUTION_SECS }
}

/// Round `val` down to the enclosing bucket boundary.
pub fn round_down(val: i64) -> i64 {
    (val / RESOLUTION_SECS) * RESOLUTION_SECS
}
