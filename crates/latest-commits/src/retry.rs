use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::auth::Auth;
use crate::cancel::CancelFlag;
use crate::transport::{Transport, TransportError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// A successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub body: Vec<u8>,
    pub attempts: u32,
}

/// Why `fetch_with_retry` gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFailure {
    /// 401/403. Returned on the attempt that saw it, never retried.
    Fatal { error: TransportError, attempts: u32 },
    /// Every attempt failed with a retryable error.
    Exhausted { error: TransportError, attempts: u32 },
    /// The run was aborted while this target still had attempts left.
    Cancelled { error: TransportError, attempts: u32 },
}

impl RetryFailure {
    pub fn error(&self) -> &TransportError {
        match self {
            Self::Fatal { error, .. }
            | Self::Exhausted { error, .. }
            | Self::Cancelled { error, .. } => error,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// Bounded retries with exponential backoff.
///
/// Attempt `k` that fails with a retryable error is followed by a sleep of
/// `backoff_base * 2^(k-1)`. Authentication failures are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF_BASE)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base,
        }
    }

    /// Effective attempt budget. `0` and `1` both mean a single attempt.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    /// Sleep after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.backoff_base
            .saturating_mul(2_u32.saturating_pow(exponent))
    }

    /// GET `url`, retrying transient failures.
    pub async fn fetch_with_retry<T>(
        &self,
        transport: &T,
        url: &str,
        auth: &Auth,
        cancel: &CancelFlag,
    ) -> Result<Fetched, RetryFailure>
    where
        T: Transport + ?Sized,
    {
        let max = self.max_attempts();
        let mut attempt = 1;

        loop {
            debug!(url, attempt, max, "requesting");

            let error = match transport.get(url, auth).await {
                Ok(body) => {
                    info!(url, attempt, max, bytes = body.len(), "fetched");
                    return Ok(Fetched {
                        body,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            if error.is_auth() {
                error!(url, attempt, max, %error, "authentication rejected");
                return Err(RetryFailure::Fatal {
                    error,
                    attempts: attempt,
                });
            }

            if attempt >= max {
                warn!(url, attempt, max, %error, "giving up");
                return Err(RetryFailure::Exhausted {
                    error,
                    attempts: attempt,
                });
            }

            if cancel.is_cancelled() {
                debug!(url, attempt, "run aborted, not retrying");
                return Err(RetryFailure::Cancelled {
                    error,
                    attempts: attempt,
                });
            }

            let delay = self.delay_for(attempt);
            warn!(
                url,
                attempt,
                max,
                %error,
                delay_ms = millis(delay),
                "attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;

            if cancel.is_cancelled() {
                debug!(url, attempt, "run aborted during backoff");
                return Err(RetryFailure::Cancelled {
                    error,
                    attempts: attempt,
                });
            }

            attempt += 1;
        }
    }
}

/// Saturates instead of truncating for delays past `u64::MAX` ms.
fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
