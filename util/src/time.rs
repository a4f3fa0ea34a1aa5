//! General time utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono;
use std::thread;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Fixed rate loop timer.
///
/// Call `sleep` once at the end of every cycle. The timer sleeps for whatever
/// remains of the current period. If a cycle overruns by more than a whole
/// period the schedule is reset rather than trying to catch up.
#[derive(Debug, Clone)]
pub struct LoopRate {
    period: Duration,
    next: Instant,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LoopRate {
    /// Create a new timer running at `rate_hz`.
    ///
    /// A non-positive or non-finite rate is treated as 1 Hz.
    pub fn new(rate_hz: f64) -> Self {
        let rate_hz = if rate_hz.is_finite() && rate_hz > 0.0 {
            rate_hz
        } else {
            1.0
        };

        Self {
            period: Duration::from_secs_f64(1.0 / rate_hz),
            next: Instant::now(),
        }
    }

    /// The period of the loop.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleep until the start of the next cycle.
    ///
    /// Returns `false` if the cycle overran its period.
    pub fn sleep(&mut self) -> bool {
        self.next += self.period;
        let now = Instant::now();

        match self.next.checked_duration_since(now) {
            Some(remaining) => {
                thread::sleep(remaining);
                true
            }
            None => {
                if now.duration_since(self.next) > self.period {
                    self.next = now;
                }
                false
            }
        }
    }

    /// Restart the schedule from now.
    pub fn reset(&mut self) {
        self.next = Instant::now();
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Convert a number of seconds into a duration.
///
/// Negative and NaN values give a zero duration, values too large to be
/// represented (including infinity) saturate.
pub fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        Duration::from_secs(0)
    } else if seconds >= u64::MAX as f64 {
        Duration::from_secs(u64::MAX)
    } else {
        Duration::from_secs_f64(seconds)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_duration_to_seconds() {
        assert_eq!(
            duration_to_seconds(chrono::Duration::milliseconds(1500)),
            Some(1.5)
        );
    }

    #[test]
    fn test_seconds_to_duration() {
        assert_eq!(seconds_to_duration(0.25), Duration::from_millis(250));
        assert_eq!(seconds_to_duration(-1.0), Duration::from_secs(0));
        assert_eq!(seconds_to_duration(f64::NAN), Duration::from_secs(0));
        assert_eq!(seconds_to_duration(f64::INFINITY), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_loop_rate_sleeps_for_period() {
        let mut rate = LoopRate::new(100.0);
        assert_eq!(rate.period(), Duration::from_millis(10));

        let start = Instant::now();
        for _ in 0..5 {
            rate.sleep();
        }

        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_loop_rate_invalid_rate() {
        assert_eq!(LoopRate::new(0.0).period(), Duration::from_secs(1));
        assert_eq!(LoopRate::new(-3.0).period(), Duration::from_secs(1));
    }
}
