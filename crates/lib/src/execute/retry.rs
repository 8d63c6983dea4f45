//! Bounded exponential backoff for provider calls, with cancellation.
//!
//! Transient provider errors (throttling, eventual consistency) are retried
//! up to `max_attempts` times. Every other error is returned immediately.
//! Cancellation stops new attempts but never aborts a call already in flight.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
  /// Cancelled before the next attempt could start.
  Cancelled,
  /// Gave up: either a fatal error or retries exhausted.
  Failed { attempts: u32, source: ProviderError },
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
  /// Total attempts, including the first one.
  pub max_attempts: u32,
  pub min_delay: Duration,
  pub max_delay: Duration,
  /// Upper bound for a single provider call.
  pub call_timeout: Duration,
  pub cancel: CancellationToken,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      min_delay: Duration::from_millis(200),
      max_delay: Duration::from_secs(5),
      call_timeout: Duration::from_secs(600),
      cancel: CancellationToken::new(),
    }
  }
}

impl RetryPolicy {
  /// Run `call` until it succeeds, fails fatally, or attempts run out.
  pub async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, RetryError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
  {
    let mut delays = ExponentialBuilder::default()
      .with_min_delay(self.min_delay)
      .with_max_delay(self.max_delay)
      .with_factor(2.0)
      .with_jitter()
      .with_max_times(self.max_attempts as usize)
      .build();

    let max_attempts = self.max_attempts.max(1);
    let mut attempts = 0u32;

    loop {
      if self.cancel.is_cancelled() {
        debug!(call = %label, attempts, "cancelled before attempt");
        return Err(RetryError::Cancelled);
      }

      attempts += 1;
      let outcome = match tokio::time::timeout(self.call_timeout, call()).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ProviderError::Timeout(self.call_timeout)),
      };

      let error = match outcome {
        Ok(value) => return Ok(value),
        Err(e) => e,
      };

      if !error.is_retryable() || attempts >= max_attempts {
        return Err(RetryError::Failed {
          attempts,
          source: error,
        });
      }

      let delay = delays.next().unwrap_or(self.max_delay);
      warn!(
        call = %label,
        attempt = attempts,
        delay_ms = delay.as_millis() as u64,
        error = %error,
        "transient provider error, retrying"
      );

      tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = self.cancel.cancelled() => {
          debug!(call = %label, attempts, "cancelled during backoff");
          return Err(RetryError::Cancelled);
        }
      }
    }
  }
}
