// src/oracle/mod.rs

//! The text-generation oracle the reflection loop drives.
//!
//! The model itself lives outside this crate; it is reached through the
//! [`Oracle`] trait. [`RetryingOracle`] adds bounded retries with
//! exponential backoff for callers that want them.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::warn;

use crate::core::OracleError;

/// Parameters of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Full prompt text.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_new_tokens: usize,
    /// Sampling temperature.
    pub temperature: f64,
    /// Whether to sample (`true`) or decode greedily.
    pub sample: bool,
}

impl GenerationRequest {
    /// Creates a request.
    pub fn new(prompt: impl Into<String>, max_new_tokens: usize, temperature: f64, sample: bool) -> Self {
        Self { prompt: prompt.into(), max_new_tokens, temperature, sample }
    }
}

/// External text-generation service.
///
/// Implementations must support low-temperature, near-deterministic calls
/// (initial solution) and higher-temperature sampled calls (refinement).
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Generates a response for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, OracleError>;
}

/// Retry schedule for [`RetryingOracle`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Growth factor between retries.
    pub backoff_multiplier: f64,
    /// Cap on a single delay.
    pub max_backoff: Duration,
    /// Fraction of the delay added as uniform random jitter.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), without jitter:
    /// `initial * multiplier^attempt`, capped at `max_backoff`.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = (self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_backoff.as_millis() as f64) as u64;
        Duration::from_millis(backoff_ms)
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let factor = rand::rng().random_range(0.0..self.jitter);
        base + base.mul_f64(factor)
    }
}

/// Wraps an oracle and retries failed calls.
///
/// Every [`OracleError`] is treated as transient; the last error is returned
/// once `max_retries` is exhausted.
pub struct RetryingOracle<O> {
    inner: O,
    policy: RetryPolicy,
}

impl<O: Oracle> RetryingOracle<O> {
    /// Wraps `inner` with the default policy.
    pub fn new(inner: O) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    /// Wraps `inner` with `policy`.
    pub fn with_policy(inner: O, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped oracle.
    pub fn inner(&self) -> &O {
        &self.inner
    }
}

#[async_trait]
impl<O: Oracle> Oracle for RetryingOracle<O> {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, OracleError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(request).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    if attempt >= self.policy.max_retries {
                        warn!(
                            attempt = attempt,
                            max_retries = self.policy.max_retries,
                            error = %err,
                            "Max retries exhausted"
                        );
                        return Err(err);
                    }

                    let backoff = self.policy.jittered(self.policy.calculate_backoff(attempt));
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Retrying oracle call after error"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
