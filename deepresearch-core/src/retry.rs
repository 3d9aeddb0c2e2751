//! Bounded retry with exponential backoff for collaborator calls.
//!
//! Every model, search, and page-retrieval call goes through [`with_retry`], so
//! each collaborator has a fixed local retry ceiling that is independent of the
//! research budget.

use crate::config::RetryConfig;
use crate::error::{CollaboratorError, LlmError};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Errors that can tell whether a retry could succeed.
pub trait Transient {
    /// True for failures worth retrying (rate limits, timeouts, connection drops).
    fn is_transient(&self) -> bool;

    /// Server-requested delay before the next attempt, if any.
    fn retry_after_secs(&self) -> Option<u64> {
        None
    }
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Timeout { .. }
                | LlmError::Connection { .. }
                | LlmError::ServerError { .. }
        )
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            LlmError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl Transient for CollaboratorError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Unavailable { .. }
                | CollaboratorError::RateLimited { .. }
                | CollaboratorError::Timeout { .. }
        )
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            CollaboratorError::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Execute an async operation, retrying transient errors with exponential backoff.
///
/// Permanent errors return immediately. At most `config.max_retries` retries
/// follow the first attempt; the last error is returned once they run out.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Backoff for the given attempt, never shorter than a server retry-after.
fn compute_backoff<E: Transient>(config: &RetryConfig, attempt: u32, err: &E) -> u64 {
    let computed = compute_exponential_backoff(config, attempt);
    match err.retry_after_secs() {
        Some(secs) => (secs * 1000).max(computed),
        None => computed,
    }
}

fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        capped + (capped as f64 * 0.25 * jitter_fraction()) as u64
    } else {
        capped
    }
}

/// Cheap jitter source in [0, 1) from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
