//! Bounded retry with a fixed pause for transport calls.
//!
//! The chat platform throttles per community, and its throttle window is
//! short. A fixed one second pause between at most three attempts is enough
//! to get past it without stalling a webhook for long:
//!
//! - Default: 3 attempts, 1s between them (2s of pauses at most)
//!
//! Only [`TransportErrorKind::is_retriable`] errors are retried. Everything
//! else is returned after the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::{TransportError, TransportErrorKind};

/// Configuration for fixed-pause retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Pause between consecutive attempts.
    pub pause: Duration,
}

impl RetryConfig {
    pub const DEFAULT: Self = Self {
        max_attempts: 3,
        pause: Duration::from_secs(1),
    };
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T> {
    /// The operation succeeded.
    Success(T),

    /// Every attempt failed with a retriable error.
    ExhaustedRetries {
        /// The last error encountered.
        last_error: TransportError,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A non-retriable error occurred.
    PermanentError(TransportError),
}

/// Executes an async operation, retrying retriable failures.
///
/// The pause happens only between attempts: a successful first call returns
/// immediately, and giving up does not sleep first.
pub async fn retry_with_pause<T, F, Fut>(config: RetryConfig, mut operation: F) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) => {
                attempt += 1;

                if !e.kind.is_retriable() {
                    return RetryResult::PermanentError(e);
                }

                if attempt >= config.max_attempts {
                    return RetryResult::ExhaustedRetries {
                        last_error: e,
                        attempts: attempt,
                    };
                }

                warn!(
                    attempt,
                    rate_limited = e.kind == TransportErrorKind::RateLimited,
                    error = %e,
                    "Transport call failed, retrying"
                );
                tokio::time::sleep(config.pause).await;
            }
        }
    }
}
