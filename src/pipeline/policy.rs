//! Retry and batching policies injected into the scraper, discovery and
//! geocoding stages.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    Linear,
    Exponential,
}

/// Sequential retry schedule for a single unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff: Backoff::Fixed,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts. Used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Delay to wait after the given failed attempt (1-based) before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor)
            }
        }
    }
}

/// Bounded fan-out with a pause between batches.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub request_timeout: Duration,
}

impl BatchPolicy {
    pub fn new(batch_size: usize, inter_batch_delay: Duration, request_timeout: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            inter_batch_delay,
            request_timeout,
        }
    }

    pub fn immediate(batch_size: usize) -> Self {
        Self::new(batch_size, Duration::ZERO, Duration::from_secs(5))
    }

    /// Pause between batches; no pause after the final batch.
    pub async fn pause(&self, batch_index: usize, total_batches: usize) {
        if batch_index + 1 < total_batches && !self.inter_batch_delay.is_zero() {
            tokio::time::sleep(self.inter_batch_delay).await;
        }
    }

    pub fn batch_count(&self, items: usize) -> usize {
        items.div_ceil(self.batch_size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedules() {
        let mut policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(3), Duration::from_millis(100));

        policy.backoff = Backoff::Linear;
        assert_eq!(policy.delay_after(3), Duration::from_millis(300));

        policy.backoff = Backoff::Exponential;
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(4), Duration::from_millis(800));
    }

    #[test]
    fn test_batch_count() {
        let policy = BatchPolicy::immediate(50);
        assert_eq!(policy.batch_count(0), 0);
        assert_eq!(policy.batch_count(50), 1);
        assert_eq!(policy.batch_count(3143), 63);
        assert_eq!(BatchPolicy::immediate(0).batch_size, 1);
    }
}
