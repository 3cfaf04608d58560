//! Bounded exponential backoff for transient storage failures

use crate::config::schema::TransferConfig;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before attempt `attempt` (0-indexed): `initial * 2^(attempt-1)`, capped
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(16);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        }
    }

    #[test]
    fn first_attempt_has_no_delay() {
        assert_eq!(policy().delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn delay_doubles_then_caps() {
        let p = policy();
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(p.delay_for_attempt(4), Duration::from_millis(800));
        assert_eq!(p.delay_for_attempt(5), Duration::from_millis(1000));
        assert_eq!(p.delay_for_attempt(40), Duration::from_millis(1000));
    }

    #[test]
    fn config_never_yields_zero_attempts() {
        let config = TransferConfig {
            max_attempts: 0,
            ..TransferConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
    }
}
