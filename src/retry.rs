//! Retry with exponential backoff.
//!
//! A [`Retrier`] runs an async operation until it succeeds, fails with an error its
//! [`RetryPolicy`] does not accept, or uses up `max_attempts`. Between attempts it
//! sleeps `min(initial_delay * exponential_base^attempt, max_delay)`, scaled by a
//! random factor in `[0.5, 1.5)` when jitter is on. A rate-limit error carrying a
//! server-provided `retry_after` is waited out exactly instead.

pub mod predicates;

use crate::error::{ApiError, ErrorKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry settings as they appear in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_exponential_base() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
            jitter: default_jitter(),
        }
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.exponential_base < 1.0 {
            return Err(format!(
                "exponential_base must be >= 1.0, got {}",
                self.exponential_base
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err("max_delay_ms must not be below initial_delay_ms".to_string());
        }
        Ok(())
    }

    pub fn to_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            exponential_base: self.exponential_base,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetrySettings::default().to_config()
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt + 1` (0-indexed), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial_delay.as_millis() as f64 * self.exponential_base.powi(exponent);
        if !millis.is_finite() || millis >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Decides which failures are worth another attempt.
#[derive(Clone)]
pub struct RetryPolicy {
    predicate: Arc<dyn Fn(&ApiError) -> bool + Send + Sync>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy").finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Retry errors whose kind is in `kinds`.
    pub fn kinds(kinds: &[ErrorKind]) -> Self {
        let kinds = kinds.to_vec();
        Self::predicate(move |err| kinds.contains(&err.kind()))
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&ApiError) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    pub fn rate_limit() -> Self {
        Self::predicate(predicates::is_rate_limit)
    }

    pub fn network() -> Self {
        Self::predicate(predicates::is_network)
    }

    pub fn rate_limit_or_network() -> Self {
        Self::rate_limit().or(Self::network())
    }

    /// Retry when either policy accepts the error.
    pub fn or(self, other: RetryPolicy) -> Self {
        let (left, right) = (self.predicate, other.predicate);
        Self::predicate(move |err| left(err) || right(err))
    }

    pub fn is_retryable(&self, err: &ApiError) -> bool {
        (self.predicate)(err)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::rate_limit_or_network()
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone)]
pub struct Retrier {
    config: RetryConfig,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Retrier {
    pub fn new(config: RetryConfig, policy: RetryPolicy) -> Self {
        Self {
            config,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, retrying retryable failures.
    ///
    /// A non-retryable error is returned as-is after a single call. When every attempt
    /// fails with a retryable error the last one is wrapped in `RetryExhausted`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempt += 1;

            if !self.policy.is_retryable(&err) {
                debug!(operation, attempt, error = %err, "non-retryable failure");
                return Err(err);
            }
            if attempt >= max_attempts {
                warn!(operation, attempts = attempt, error = %err, "retries exhausted");
                return Err(ApiError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.delay_after(&err, attempt - 1);
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after failure"
            );
            self.sleeper.sleep(delay).await;
        }
    }

    fn delay_after(&self, err: &ApiError, attempt: u32) -> Duration {
        if let ApiError::ProviderRateLimit {
            retry_after: Some(wait),
            ..
        } = err
        {
            return *wait;
        }
        let delay = self.config.delay_for_attempt(attempt);
        if self.config.jitter {
            delay.mul_f64(jitter_factor())
        } else {
            delay
        }
    }
}

/// Uniform factor in `[0.5, 1.5)`; falls back to 1.0 if no randomness is available.
fn jitter_factor() -> f64 {
    let mut bytes = [0u8; 4];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => 0.5 + f64::from(u32::from_le_bytes(bytes)) / (f64::from(u32::MAX) + 1.0),
        Err(_) => 1.0,
    }
}
