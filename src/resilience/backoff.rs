//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Delay schedule between Ambassador attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub max: Duration,
    pub jitter: bool,
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier.max(1.0),
            max: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl BackoffPolicy {
    /// Un-jittered delay before retry number `retry` (1-based), capped at `max`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = (retry - 1).min(i32::MAX as u32) as i32;
        let delay_ns = self.base.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !delay_ns.is_finite() || delay_ns >= self.max.as_nanos() as f64 {
            return self.max;
        }
        Duration::from_nanos(delay_ns.round() as u64)
    }

    /// Delay before retry number `retry`, with upward jitter when enabled.
    ///
    /// Jitter is at most 10% and never more than the growth to the next
    /// step, so successive delays keep increasing until the cap. It never
    /// pushes a delay past `max`.
    pub fn delay(&self, retry: u32) -> Duration {
        let delay = self.base_delay(retry);
        if !self.jitter {
            return delay;
        }

        let ratio = (self.multiplier - 1.0).clamp(0.0, 0.1);
        let jitter_range = (delay.as_nanos() as f64 * ratio) as u64;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        (delay + Duration::from_nanos(jitter)).min(self.max.max(delay))
    }
}
