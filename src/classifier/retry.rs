//! Bounded retry with exponential backoff

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::ClassifierError;

/// Default number of attempts per batch
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay after the first failed attempt (ms)
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 4_000;

/// Default growth factor between consecutive delays
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Retry policy for the delegated classifier.
///
/// The delay after failed attempt `k` (1-based) is
/// `initial_delay * multiplier^(k - 1)`. With the defaults: 4s, then 8s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    /// Upper bound on a single backend call; None waits indefinitely
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            attempt_timeout_ms: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: initial_delay.as_millis() as u64,
            multiplier,
            attempt_timeout_ms: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Reject policies whose delays would not strictly increase
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.max_attempts == 0 {
            return Err(ClassifierError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.initial_delay_ms == 0 {
            return Err(ClassifierError::InvalidPolicy(
                "initial_delay_ms must be positive".to_string(),
            ));
        }
        if !(self.multiplier.is_finite() && self.multiplier > 1.0) {
            return Err(ClassifierError::InvalidPolicy(format!(
                "multiplier must be greater than 1, got {}",
                self.multiplier
            )));
        }
        if self.attempt_timeout_ms == Some(0) {
            return Err(ClassifierError::InvalidPolicy(
                "attempt_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis.round() as u64)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }
}

/// Lifecycle of one delegated classification call.
///
/// `Success` and `Failed` are terminal. `Retrying` only occurs between
/// attempts and never outlives the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationState {
    Idle,
    Requesting { attempt: u32 },
    Retrying { attempt: u32, delay: Duration },
    Success { attempts: u32 },
    Failed { attempts: u32 },
}

impl ClassificationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClassificationState::Success { .. } | ClassificationState::Failed { .. }
        )
    }
}

/// Source of backoff delays, injectable so retry logic can be tested without
/// waiting on the wall clock
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl<T: Sleeper + ?Sized> Sleeper for Arc<T> {
    async fn sleep(&self, delay: Duration) {
        (**self).sleep(delay).await;
    }
}
