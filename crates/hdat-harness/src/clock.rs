//! Clock abstraction for run timestamps.
//!
//! Real and scripted implementations so run ordering can be tested
//! deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time as microseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_micros(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
            })
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    micros: u64,
}

impl FixedClock {
    pub const fn new(micros: u64) -> Self {
        Self { micros }
    }
}

impl Clock for FixedClock {
    fn now_micros(&self) -> u64 {
        self.micros
    }
}

/// Advances by a fixed step on every reading.
#[derive(Debug)]
pub struct SteppingClock {
    micros: AtomicU64,
    step: u64,
}

impl SteppingClock {
    pub const fn new(start_micros: u64, step: u64) -> Self {
        Self {
            micros: AtomicU64::new(start_micros),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now_micros(&self) -> u64 {
        self.micros.fetch_add(self.step, Ordering::SeqCst)
    }
}

/// Convert clock microseconds into the `ran_on` seconds stored on results.
pub fn micros_to_seconds(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_fixed() {
        let clock = FixedClock::new(1_500_000);
        assert_eq!(clock.now_micros(), 1_500_000);
        assert_eq!(clock.now_micros(), 1_500_000);
        assert_eq!(micros_to_seconds(clock.now_micros()), 1.5);
    }

    #[test]
    fn stepping_clock_advances() {
        let clock = SteppingClock::new(10, 5);
        assert_eq!(clock.now_micros(), 10);
        assert_eq!(clock.now_micros(), 15);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_micros() > 1_577_836_800_000_000);
    }
}
