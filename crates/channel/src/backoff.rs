//! Reconnect delay policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);

/// How the delay grows between consecutive reconnect attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Every attempt waits `base_delay`.
    Fixed,
    /// Attempt N waits `base_delay * N`.
    #[default]
    Linear,
    /// Attempt N waits `base_delay * 2^(N-1)`.
    Exponential,
}

impl std::fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Linear => write!(f, "linear"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

/// Bounded reconnect policy.
///
/// `max_retries` counts consecutive failed or closed attempts since the last
/// successful connection. `None` retries forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: Option<u32>,
    pub base_delay: Duration,
    pub strategy: BackoffStrategy,
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Some(DEFAULT_MAX_RETRIES),
            base_delay: DEFAULT_BASE_DELAY,
            strategy: BackoffStrategy::Linear,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Policy that never reconnects on its own.
    pub fn never() -> Self {
        Self {
            max_retries: Some(0),
            ..Self::default()
        }
    }

    /// Whether another attempt may be scheduled after `retry_count` failures.
    pub fn allows(&self, retry_count: u32) -> bool {
        self.max_retries.is_none_or(|max| retry_count < max)
    }

    /// Delay before the given 1-based reconnect attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            },
        };
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}
