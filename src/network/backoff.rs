// src/network/backoff.rs
//! Bounded exponential backoff
//!
//! Transient job-server failures are retried with delays that double
//! from a base up to a hard cap, so a flapping server is neither hammered
//! nor waited on forever.

use std::time::Duration;

/// Exponential backoff schedule with a saturation cap
#[derive(Debug, Clone)]
pub struct Backoff {
    /// First delay handed out
    base: Duration,
    /// Largest delay ever handed out
    cap: Duration,
    /// Number of delays handed out since the last reset
    attempt: u32,
}

impl Backoff {
    /// Creates a schedule starting at `base` and saturating at `cap`
    pub fn new(base: Duration, cap: Duration) -> Self {
        Backoff {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Returns the next delay: `base * 2^n`, capped
    pub fn next_delay(&mut self) -> Duration {
        // shift is clamped so the multiplier cannot overflow u32
        let factor = 1u32 << self.attempt.min(16);
        let delay = self.base.saturating_mul(factor).min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Restarts the schedule after a success
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
