//! Retry utilities: backoff builders and retryable error classification.
//!
//! Uses `backon` for exponential backoff with jitter. Membership and cascade
//! transactions are retried only on transient failures; invariant violations
//! surface to the caller on the first attempt.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::storage::StorageError;

/// Standard backoff for transactions aborted by a concurrent writer.
///
/// - Min delay: 10ms
/// - Max delay: 1s
/// - Max attempts: 8
/// - Jitter enabled
pub fn transaction_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_secs(1))
        .with_max_times(8)
        .with_jitter()
}

/// Determines if a storage error is worth another attempt.
pub fn is_retryable(error: &StorageError) -> bool {
    error.is_transient()
}

/// Log hook for `backon::Retryable::notify`.
pub fn log_retry(operation: &'static str) -> impl Fn(&StorageError, Duration) {
    move |err: &StorageError, dur: Duration| {
        tracing::warn!(operation, error = %err, delay = ?dur, "Transient storage failure, retrying");
    }
}
