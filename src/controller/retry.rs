use crate::api::ApiError;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Bounded retry for transient status-check failures
pub struct RetryPolicy {
    max_retries: u8,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u8, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn should_retry(&self, attempt: u8, error: &ApiError) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        error.is_retryable()
    }

    /// base * 2^attempt, capped at 30s
    pub fn backoff(&self, attempt: u8) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt as u32);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}
