use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stride_common::{CoachError, Result};
use tracing::warn;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all; used by tests and one-shot callers.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn compute_delay(&self, attempt: u32) -> u64 {
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let jitter = (base * 0.1 * jitter_fraction(attempt)) as u64;
        (base as u64).saturating_add(jitter).min(self.max_delay_ms)
    }
}

/// Deterministic jitter in [0, 1) derived from the attempt number.
fn jitter_fraction(attempt: u32) -> f64 {
    let x = attempt.wrapping_mul(2_654_435_761);
    (x % 100) as f64 / 100.0
}

/// Extract a `retry-after: N` hint (seconds) from an error message, in ms.
fn retry_after_ms(error: &CoachError) -> Option<u64> {
    let msg = error.to_string().to_lowercase();
    let pos = msg.find("retry-after")?;
    msg[pos..]
        .split_whitespace()
        .skip(1)
        .find_map(|word| {
            word.trim_end_matches(|c: char| !c.is_ascii_digit())
                .parse::<u64>()
                .ok()
        })
        .map(|secs| secs * 1000)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is exhausted. Only errors reporting `is_retryable()` are retried.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, service: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries && e.is_retryable() => {
                let delay = retry_after_ms(&e)
                    .map(|ms| ms.min(config.max_delay_ms))
                    .unwrap_or_else(|| config.compute_delay(attempt));

                warn!(
                    service = service,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay,
                    error = %e,
                    "Retrying request"
                );

                tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct RetryingClient<T: LlmClient> {
    inner: T,
    config: RetryConfig,
}

impl<T: LlmClient> RetryingClient<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<T: LlmClient> LlmClient for RetryingClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        with_retry(&self.config, self.inner.model_name(), || {
            self.inner.complete(request.clone())
        })
        .await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
