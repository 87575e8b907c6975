//! Bounded retry with exponential backoff.
//!
//! Only transient failures (timeouts, rate limiting) are retried, and only
//! within the current run.
//!
//! ```rust,ignore
//! let records = with_retry(&RetryConfig::default(), || async {
//!     adapter.fetch(&entity).await
//! })
//! .await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use asset_data::SourceError;

/// Errors that know whether another attempt can help.
pub trait Retryable: Display {
    fn is_retryable(&self) -> bool;

    /// Errors that must stop the run, never retried.
    fn is_fatal(&self) -> bool {
        false
    }
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub use_exponential_backoff: bool,
    pub backoff_multiplier: f64,
    /// ±25% random spread on each delay.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Short delays, for tests and local endpoints.
    pub fn fast() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            use_exponential_backoff: true,
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay = if self.use_exponential_backoff && attempt > 0 {
            let multiplier = self.backoff_multiplier.powi(attempt as i32);
            Duration::from_secs_f64(self.base_delay.as_secs_f64() * multiplier)
        } else {
            self.base_delay
        };
        let delay = delay.min(self.max_delay);

        if self.add_jitter {
            let spread = delay.as_secs_f64() * 0.25;
            let jitter = rand::thread_rng().gen_range(-spread..=spread);
            Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0))
        } else {
            delay
        }
    }
}

/// Run `operation`, retrying retryable errors up to `config.max_retries` times.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    E: Retryable,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if e.is_fatal() || !e.is_retryable() {
                    return Err(e);
                }
                if attempt >= config.max_retries {
                    warn!(error = %e, attempts = attempt + 1, "retries exhausted");
                    return Err(e);
                }

                let delay = config.calculate_delay(attempt);
                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
