/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Epoch nanosecond clock abstraction.
//!
//! Protocol timers (heartbeats, keepalives, logout timers) never read system
//! time directly. They are handed an [`EpochNanoClock`] at construction, which
//! makes every timeout deterministic under test.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A clock returning nanoseconds since the Unix epoch.
pub trait EpochNanoClock: Send + Sync {
    /// Returns the current time in nanoseconds since 1970-01-01 00:00:00 UTC.
    fn nanos(&self) -> u64;
}

/// Production clock backed by the operating system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNanoClock;

impl EpochNanoClock for SystemNanoClock {
    fn nanos(&self) -> u64 {
        Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Shared freely via [`Clone`]; all clones observe the same instant.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock starting at the given nanosecond timestamp.
    #[must_use]
    pub fn new(start_nanos: u64) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(start_nanos)),
        }
    }

    /// Moves the clock forward.
    ///
    /// # Arguments
    /// * `delta_nanos` - Nanoseconds to advance by
    pub fn advance(&self, delta_nanos: u64) {
        self.nanos.fetch_add(delta_nanos, Ordering::SeqCst);
    }

    /// Moves the clock forward by whole milliseconds.
    pub fn advance_millis(&self, delta_millis: u64) {
        self.advance(delta_millis * 1_000_000);
    }

    /// Sets the clock to an absolute nanosecond timestamp.
    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl EpochNanoClock for ManualClock {
    fn nanos(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.nanos(), 1_000);

        clock.advance(500);
        assert_eq!(clock.nanos(), 1_500);

        clock.advance_millis(2);
        assert_eq!(clock.nanos(), 2_001_500);
    }

    #[test]
    fn test_manual_clock_shared_view() {
        let clock = ManualClock::new(0);
        let other = clock.clone();

        clock.set(42);
        assert_eq!(other.nanos(), 42);
    }

    #[test]
    fn test_system_clock_monotonic_enough() {
        let clock = SystemNanoClock;
        let a = clock.nanos();
        let b = clock.nanos();
        assert!(b >= a);
    }
}
