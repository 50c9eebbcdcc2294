//! Retry logic with linear backoff
//!
//! Attempt `n` (zero-based) that fails with a retryable error is followed by a
//! wait of `retry_delay * (n + 1)`, optionally jittered. Cancellation is never
//! retried and also interrupts the backoff sleep. When the last attempt fails
//! the error is wrapped in [`Error::TerminalIo`].
//!
//! # Example
//!
//! ```no_run
//! use tabula_export::config::DownloadConfig;
//! use tabula_export::error::Error;
//! use tabula_export::retry::retry_with_backoff;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = DownloadConfig::default();
//! let token = CancellationToken::new();
//! let body = retry_with_backoff(&config, &token, |attempt| async move {
//!     // Your operation here
//!     Ok::<_, Error>(format!("fetched on attempt {attempt}"))
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::lifecycle::CancelReason;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network errors, timeouts, server errors) should return `true`.
/// Permanent failures (bad input, missing exporter, cancellation) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::TransientIo { .. } => true,
            // Any transport-level failure is worth another attempt
            Error::Network(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Error::Cancelled(_) => false,
            // Already exhausted
            Error::TerminalIo { .. } => false,
            Error::Validation { .. } | Error::Config { .. } | Error::Csv(_) => false,
            Error::Sink(_) => false,
            Error::ExporterNotFound { .. }
            | Error::DependencyMissing { .. }
            | Error::BuilderRequired { .. }
            | Error::BuilderUnsupported { .. }
            | Error::CapabilityMismatch { .. } => false,
            Error::Serialization(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// Backoff before the attempt following `attempt` (zero-based), without jitter
pub fn backoff_delay(retry_delay: Duration, attempt: u32) -> Duration {
    retry_delay.saturating_mul(attempt.saturating_add(1))
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
///
/// `operation` receives the zero-based attempt number. Up to
/// `config.retries + 1` attempts are made. Cancellation of `token`, either
/// reported by the operation or observed during backoff, returns
/// [`Error::Cancelled`] immediately.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &DownloadConfig,
    token: &CancellationToken,
    operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_policy(config, token, Error::is_retryable, operation).await
}

/// Like [`retry_with_backoff`], with `should_retry` deciding which errors get another attempt
///
/// Cancellation is never retried, whatever the policy says.
pub async fn retry_with_policy<F, Fut, T, P>(
    config: &DownloadConfig,
    token: &CancellationToken,
    should_retry: P,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let max_attempts = config.retries.saturating_add(1);
    let mut attempt = 0;

    loop {
        if token.is_cancelled() {
            return Err(Error::Cancelled(CancelReason::Parent));
        }

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) if !should_retry(&e) => {
                tracing::error!(error = %e, "Operation failed with non-retryable error");
                return Err(e);
            }
            Err(e) if attempt + 1 >= max_attempts => {
                tracing::error!(
                    error = %e,
                    attempts = attempt + 1,
                    "Operation failed after all retry attempts exhausted"
                );
                return Err(Error::TerminalIo {
                    attempts: attempt + 1,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                let delay = backoff_delay(config.retry_delay, attempt);
                let delay = if config.jitter { add_jitter(delay) } else { delay };

                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                tokio::select! {
                    _ = token.cancelled() => return Err(Error::Cancelled(CancelReason::Parent)),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
