//! Retry policy for webhook deliveries.
//!
//! Implements exponential backoff bounded by an attempt count and a total
//! wall-clock window.

use crate::config::WebhookSettings;
use crate::error::{EngineError, EngineResult};
use std::time::Duration;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Cap for exponential growth.
    pub max_backoff: Duration,
    /// Multiplier applied to backoff after each attempt.
    pub backoff_multiplier: f64,
    /// No retry is scheduled past this much time since the first attempt.
    pub max_retry_window: Duration,
}

impl RetryPolicy {
    pub fn new(config: &WebhookSettings) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            backoff_multiplier: config.backoff_multiplier,
            max_retry_window: config.max_retry_window,
        }
    }

    /// Delay after the `attempts`-th failed attempt:
    /// `initial_backoff * multiplier^(attempts - 1)`, capped at `max_backoff`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !backoff.is_finite() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(backoff.max(0.0)).min(self.max_backoff)
    }

    /// Whether a delivery that failed with `error` after `attempts` attempts,
    /// `elapsed` after its first attempt, gets another one.
    pub fn should_retry(&self, error: &EngineError, attempts: u32, elapsed: Duration) -> bool {
        error.is_retryable()
            && attempts < self.max_attempts
            && elapsed + self.backoff(attempts) <= self.max_retry_window
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&WebhookSettings::default())
    }
}

/// Maps an HTTP response status to a delivery outcome. 2xx succeeds, 5xx is
/// transient, everything else is permanent.
pub fn classify_status(status: u16) -> EngineResult<()> {
    match status {
        200..=299 => Ok(()),
        500..=599 => Err(EngineError::TransientIo(format!(
            "endpoint responded with status {}",
            status
        ))),
        _ => Err(EngineError::PermanentDelivery {
            status,
            message: reason_phrase(status).to_string(),
        }),
    }
}

fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unexpected status")
}
