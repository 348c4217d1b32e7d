//! Retry with exponential backoff and jitter
//!
//! Validation and configuration failures are returned after the first
//! attempt. Everything else is retried until `max_attempts` is reached, then
//! surfaced as [`SyncError::RetryExhausted`] (a dependency failure).

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};

/// Delay before the retry that follows failed attempt `attempt` (0-based):
/// `2^attempt * initial_delay * (1 + jitter)` with jitter in `[0, max_jitter)`
pub fn backoff_delay(config: &RetryConfig, attempt: u32, jitter: f64) -> Duration {
	let factor = 2f64.powi(attempt.min(30) as i32) * (1.0 + jitter.clamp(0.0, config.max_jitter.max(0.0)));
	Duration::try_from_secs_f64(config.initial_delay().as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

fn random_jitter(max: f64) -> f64 {
	if max <= 0.0 {
		return 0.0;
	}
	rand::thread_rng().gen_range(0.0..max)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out of attempts
pub async fn with_retry<T, F, Fut>(operation: &str, config: &RetryConfig, mut op: F) -> SyncResult<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = SyncResult<T>>,
{
	let max_attempts = config.max_attempts.max(1);
	let mut attempt = 0;
	loop {
		let err = match op().await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};
		attempt += 1;

		if !err.is_retryable() {
			debug!("{}: {} failure is not retried: {}", operation, err.kind(), err);
			return Err(err);
		}
		if attempt >= max_attempts {
			warn!("{}: giving up after {} attempt(s): {}", operation, attempt, err);
			return Err(SyncError::RetryExhausted {
				operation: operation.to_string(),
				attempts: attempt,
				source: Box::new(err),
			});
		}

		let delay = backoff_delay(config, attempt - 1, random_jitter(config.max_jitter));
		debug!("{}: attempt {} failed ({}), retrying in {:?}", operation, attempt, err, delay);
		tokio::time::sleep(delay).await;
	}
}


// vim: ts=4
