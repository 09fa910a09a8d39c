//! Bounded retry with backoff.
//!
//! One combinator serves every retry loop; each call site brings its own
//! [`RetryPolicy`] and decides which errors are worth another attempt.

use std::future::Future;

use sealcraft_core::config::RetryPolicy;
use sealcraft_core::error::SealError;
use tokio_util::sync::CancellationToken;

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError {
    /// The predicate declined to retry; the error is passed through untouched.
    Fatal(SealError),
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last: SealError },
    /// Cancelled while waiting between attempts.
    Cancelled,
}

impl RetryError {
    /// Collapse into a plain error, building the exhaustion error lazily.
    pub fn into_error(self, exhausted: impl FnOnce(u32, SealError) -> SealError) -> SealError {
        match self {
            RetryError::Fatal(e) => e,
            RetryError::Exhausted { attempts, last } => exhausted(attempts, last),
            RetryError::Cancelled => SealError::Cancelled("retry loop".to_string()),
        }
    }
}

/// Run `op` up to `policy.max_attempts` times.
///
/// After a failed attempt, `is_retryable` decides between giving up and
/// sleeping for `policy.delay_after(attempt)`. A policy with zero attempts
/// still runs once.
pub async fn retry<T, F, Fut, P>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SealError>>,
    P: Fn(&SealError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !is_retryable(&err) {
            return Err(RetryError::Fatal(err));
        }

        attempt += 1;
        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.delay_after(attempt - 1);
        tracing::debug!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after failure"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
