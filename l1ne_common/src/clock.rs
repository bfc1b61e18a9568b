//! Dual-mode monotonic clock.
//!
//! Every timestamp in the system comes from a `Clock` handle passed in
//! explicitly — there is no ambient time source. The mode is fixed at
//! construction: `Real` samples the host monotonic clock anchored to the
//! wall-clock microsecond epoch taken once at construction; `Simulated`
//! only moves when the owner calls [`Clock::advance`] or
//! [`Clock::set_time`].
//!
//! `now_us` enforces monotonicity: observing a timestamp smaller than the
//! previous one is a contract violation and aborts the process.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Time source selection, immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Host monotonic clock.
    Real,
    /// Explicitly advanced simulation time.
    Simulated,
}

/// Monotonic microsecond clock.
#[derive(Debug, Clone)]
pub struct Clock {
    mode: ClockMode,
    last_timestamp_us: u64,
    simulated_time_us: u64,
    anchor: Instant,
    anchor_wall_us: u64,
}

impl Clock {
    /// Create a clock that samples the host monotonic clock.
    pub fn real() -> Self {
        let wall_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        Self {
            mode: ClockMode::Real,
            last_timestamp_us: 0,
            simulated_time_us: 0,
            anchor: Instant::now(),
            // Timestamps are strictly positive even on a host whose wall
            // clock reads the epoch.
            anchor_wall_us: wall_us.max(1),
        }
    }

    /// Create a simulated clock starting at 1 µs.
    pub fn simulated() -> Self {
        Self::simulated_at(1)
    }

    /// Create a simulated clock starting at `start_us`.
    pub fn simulated_at(start_us: u64) -> Self {
        assert!(start_us > 0, "timestamps are strictly positive");
        Self {
            mode: ClockMode::Simulated,
            last_timestamp_us: 0,
            simulated_time_us: start_us,
            anchor: Instant::now(),
            anchor_wall_us: 0,
        }
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Observe the current time in microseconds.
    ///
    /// Successive calls never go backwards.
    pub fn now_us(&mut self) -> u64 {
        let current = match self.mode {
            ClockMode::Simulated => self.simulated_time_us,
            ClockMode::Real => self.anchor_wall_us + self.anchor.elapsed().as_micros() as u64,
        };
        assert!(
            current >= self.last_timestamp_us,
            "clock went backwards: {current} < {}",
            self.last_timestamp_us
        );
        self.last_timestamp_us = current;
        current
    }

    /// Advance simulated time by a strictly positive delta.
    ///
    /// Calling this on a `Real` clock is a contract violation.
    pub fn advance(&mut self, delta_us: u64) {
        assert_eq!(
            self.mode,
            ClockMode::Simulated,
            "real clocks cannot be advanced"
        );
        assert!(delta_us > 0, "clock advance must be strictly positive");
        self.simulated_time_us += delta_us;
    }

    /// Jump simulated time forward to `timestamp_us`.
    ///
    /// Setting a timestamp in the past, or calling this on a `Real` clock,
    /// is a contract violation.
    pub fn set_time(&mut self, timestamp_us: u64) {
        assert_eq!(
            self.mode,
            ClockMode::Simulated,
            "real clocks cannot be set"
        );
        assert!(
            timestamp_us >= self.simulated_time_us,
            "clock set_time going backwards: {timestamp_us} < {}",
            self.simulated_time_us
        );
        self.simulated_time_us = timestamp_us;
    }

    /// Last timestamp handed out by [`Clock::now_us`].
    pub fn last_timestamp_us(&self) -> u64 {
        self.last_timestamp_us
    }

    /// Current simulated time (valid in `Simulated` mode only).
    pub fn simulated_time_us(&self) -> u64 {
        self.simulated_time_us
    }
}
