//! Bounded-attempt retry with capped exponential backoff.
//!
//! [`RetryPolicy::execute`] drives one idempotent operation (a single record
//! pull) until it succeeds, fails in a non-retryable way, or spends its
//! attempt budget. The attempt counter lives on the stack of each call, so one
//! policy can be shared by any number of concurrent workers.
//!
//! Errors tell the policy how to react through [`Classify`]:
//!
//! - [`FailureClass::Transient`] - retried after a backoff sleep
//! - [`FailureClass::Permanent`] - returned at once, the identifier is unfetchable
//! - [`FailureClass::Fatal`] - returned at once and propagated past the record

pub mod notice;

use crate::pull::config;
use crate::shutdown::SharedShutdown;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

pub use notice::RetryNotice;

/// How a failed attempt should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network or server hiccup, worth another attempt
    Transient,
    /// The identifier itself cannot be fetched, retrying is pointless
    Permanent,
    /// Nothing else can proceed either (e.g. the session cannot be restored)
    Fatal,
}

/// Classification of an operation error for the retry policy
pub trait Classify {
    /// Failure class of this error
    fn class(&self) -> FailureClass;
}

/// Terminal outcome of a retried operation that did not succeed
#[derive(Debug, thiserror::Error)]
pub enum RetryFailure<E> {
    /// Every attempt failed transiently
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made (equals the policy's `max_attempts`)
        attempts: u32,
        /// Error of the final attempt
        last: E,
    },

    /// A non-retryable error short-circuited the attempts
    #[error("permanent failure on attempt {attempt}: {error}")]
    Permanent {
        /// Attempt that failed
        attempt: u32,
        /// The error
        error: E,
    },

    /// An error that must stop the caller entirely
    #[error("fatal failure on attempt {attempt}: {error}")]
    Fatal {
        /// Attempt that failed
        attempt: u32,
        /// The error
        error: E,
    },

    /// Shutdown was requested before the operation could succeed
    #[error("cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts made before cancellation
        attempts: u32,
    },
}

impl<E> RetryFailure<E> {
    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryFailure::Exhausted { attempts, .. } | RetryFailure::Cancelled { attempts } => {
                *attempts
            }
            RetryFailure::Permanent { attempt, .. } | RetryFailure::Fatal { attempt, .. } => {
                *attempt
            }
        }
    }

    /// The underlying error, if any attempt produced one
    pub fn error(&self) -> Option<&E> {
        match self {
            RetryFailure::Exhausted { last, .. } => Some(last),
            RetryFailure::Permanent { error, .. } | RetryFailure::Fatal { error, .. } => {
                Some(error)
            }
            RetryFailure::Cancelled { .. } => None,
        }
    }

    /// Whether the record should be marked failed and the walk continue
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            RetryFailure::Exhausted { .. } | RetryFailure::Permanent { .. }
        )
    }
}

/// Retry policy with capped exponential backoff and jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    factor: u32,
    max_delay: Duration,
    jitter: f64,
    shutdown: Option<SharedShutdown>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: config::MAX_ATTEMPTS,
            base_delay: Duration::from_millis(config::BASE_DELAY_MS),
            factor: config::BACKOFF_FACTOR,
            max_delay: Duration::from_millis(config::MAX_DELAY_MS),
            jitter: config::JITTER,
            shutdown: None,
        }
    }
}

impl RetryPolicy {
    /// Policy with the default pull configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that retries without sleeping (tests, dry runs)
    pub fn immediate(max_attempts: u32) -> Self {
        Self::default()
            .with_max_attempts(max_attempts)
            .with_base_delay(Duration::ZERO)
            .with_jitter(0.0)
    }

    /// Set the attempt budget (at least one attempt is always made)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the delay before the first retry
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the delay multiplier
    pub fn with_factor(mut self, factor: u32) -> Self {
        self.factor = factor.max(1);
        self
    }

    /// Set the cap on a single delay
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set relative jitter, clamped to `0.0..=1.0`
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Wake backoff sleeps early when shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Attempt budget
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry_index` (0-based), without jitter:
    /// `min(base * factor^retry_index, cap)`
    pub fn backoff(&self, retry_index: u32) -> Duration {
        self.factor
            .checked_pow(retry_index)
            .and_then(|multiplier| self.base_delay.checked_mul(multiplier))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let scale = rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        delay.mul_f64(scale)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    async fn sleep(&self, delay: Duration) -> bool {
        match &self.shutdown {
            Some(shutdown) => shutdown.sleep_or_shutdown(delay).await,
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }

    /// Run `operation` until it succeeds or the policy gives up.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        self.execute_for("", operation).await
    }

    /// Like [`RetryPolicy::execute`], naming `subject` in retry log messages
    pub async fn execute_for<T, E, F, Fut>(
        &self,
        subject: &str,
        mut operation: F,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let mut attempt = 0;

        loop {
            if self.shutdown_requested() {
                return Err(RetryFailure::Cancelled { attempts: attempt });
            }

            attempt += 1;
            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, subject, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            match error.class() {
                FailureClass::Permanent => {
                    return Err(RetryFailure::Permanent { attempt, error });
                }
                FailureClass::Fatal => {
                    return Err(RetryFailure::Fatal { attempt, error });
                }
                FailureClass::Transient => {}
            }

            if attempt >= self.max_attempts {
                let notice = RetryNotice::new(
                    attempt,
                    self.max_attempts,
                    Duration::ZERO,
                    subject,
                    error.to_string(),
                );
                error!(
                    attempt,
                    max_attempts = self.max_attempts,
                    "{}",
                    notice.format_exhausted()
                );
                return Err(RetryFailure::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.jittered(self.backoff(attempt - 1));
            let notice =
                RetryNotice::new(attempt, self.max_attempts, delay, subject, error.to_string());
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                backoff_ms = delay.as_millis() as u64,
                "{}",
                notice.format_retry()
            );
            crate::metrics::record_retry(delay);

            if !self.sleep(delay).await {
                return Err(RetryFailure::Cancelled { attempts: attempt });
            }
        }
    }
}
