//! Reconnect backoff
//!
//! Exponential delays with proportional jitter and an optional cap on
//! consecutive failures. A successful connection calls
//! [`RetryPolicy::reset`].

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Each delay is moved by up to this fraction either way (0.0..=1.0)
    pub jitter_ratio: f64,
    /// Give up after this many consecutive failures; `None` retries forever
    pub max_retries: Option<u32>,
    attempt: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2.0, Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn new(initial_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            multiplier: multiplier.max(1.0),
            max_delay: max_delay.max(initial_delay),
            jitter_ratio: 0.2,
            max_retries: None,
            attempt: 0,
        }
    }

    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Failures since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_retries.is_some_and(|max| self.attempt >= max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next attempt, or `None` once the cap is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let base = self.base_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let unit = rand::thread_rng().gen_range(-1.0..=1.0);
        Some(self.jittered(base, unit))
    }

    /// Delay for the `attempt`-th retry before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Apply jitter for `unit` in -1.0..=1.0, never exceeding `max_delay`.
    pub fn jittered(&self, base: Duration, unit: f64) -> Duration {
        let offset = base.as_secs_f64() * self.jitter_ratio * unit.clamp(-1.0, 1.0);
        let secs = (base.as_secs_f64() + offset).max(0.0);
        Duration::from_secs_f64(secs).min(self.max_delay)
    }
}
