use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::PricingError;

/// Timeout and retry budget applied to every network lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Attempts after the first one
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            ..Self::default()
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the budget is spent.
    ///
    /// Only request failures and timeouts are retried; "no data" answers are final.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, PricingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PricingError>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(PricingError::Timeout(self.timeout.as_secs())),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    warn!("{} failed ({}), retry {}/{}", what, e, attempt, self.max_retries);
                    let delay = self.backoff * attempt;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    debug!("{} gave up after {} attempt(s): {}", what, attempt + 1, e);
                    return Err(e);
                }
            }
        }
    }
}

fn is_retryable(err: &PricingError) -> bool {
    matches!(err, PricingError::Request { .. } | PricingError::Timeout(_))
}
