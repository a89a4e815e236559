//! Retry policy for a single upstream call.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries).
//! - Every failure is classified before anything else happens. `Terminal` failures return
//!   immediately, whatever budget is left. `Retryable` failures wait and try again.
//! - The wait after failed attempt `n` is `min(base * 2^(n-1), cap)`. A rate-limit hint raises
//!   the wait to at least the hint, still capped.
//! - Running out of attempts on retryable failures yields `UpstreamError::RetriesExhausted`
//!   wrapping the final failure.
//!
//! Invariants:
//! - Attempts never exceed `max_attempts`.
//! - Attempt counters, the last failure and the next delay live in a per-call `RetryState` on
//!   the stack of one `execute` call. The policy itself is immutable configuration and is
//!   shared freely between concurrent calls and requests.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use pokegate::{Dependency, InstantSleeper, RetryPolicy, UpstreamError};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(100))
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let report = policy
//!     .execute(Dependency::Metadata, |_attempt| async {
//!         Err::<(), _>(UpstreamError::transient("connection reset"))
//!     })
//!     .await;
//! assert_eq!(report.attempts, 3);
//! assert!(matches!(report.result, Err(UpstreamError::RetriesExhausted { .. })));
//! # });
//! ```

use crate::backoff::{Backoff, BackoffError, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use crate::error::{ErrorKind, UpstreamError};
use crate::outcome::Dependency;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{Telemetry, TelemetryRecord};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Total attempts used when nothing else is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Verdict of the classifier for one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    Terminal,
}

/// Default classifier: transient network and rate-limit failures are retryable, everything
/// else is terminal.
pub fn classify(error: &UpstreamError) -> Classification {
    match error.kind() {
        ErrorKind::TransientNetwork | ErrorKind::RateLimit => Classification::Retryable,
        ErrorKind::TerminalClient | ErrorKind::RetriesExhausted | ErrorKind::Internal => {
            Classification::Terminal
        }
    }
}

type Classifier = dyn Fn(&UpstreamError) -> Classification + Send + Sync;

/// Result of one retried call plus the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryReport<T> {
    pub result: Result<T, UpstreamError>,
    pub attempts: u32,
}

/// Bookkeeping for one outstanding call. Never leaves `RetryPolicy::execute`.
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    last_error: Option<UpstreamError>,
    next_delay: Duration,
}

impl RetryState {
    fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    fn schedule(&mut self, error: UpstreamError, delay: Duration) {
        self.last_error = Some(error);
        self.next_delay = delay;
    }
}

/// Bounded retry with deterministic exponential backoff.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    classifier: Arc<Classifier>,
    sleeper: Arc<dyn Sleeper>,
    telemetry: Telemetry,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("sleeper", &self.sleeper)
            .field("classifier", &"<classifier>")
            .finish()
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Wait before the attempt following failed attempt `attempt`.
    pub fn delay_after(&self, attempt: u32, error: &UpstreamError) -> Duration {
        let computed = self.backoff.delay(attempt);
        match error.retry_after() {
            Some(hint) => hint.max(computed).min(self.backoff.cap()),
            None => computed,
        }
    }

    /// Run `operation` until it succeeds, fails terminally, or the attempt budget is spent.
    ///
    /// `operation` receives the 1-indexed attempt number. `dependency` labels the telemetry
    /// records emitted for scheduled and exhausted retries.
    pub async fn execute<T, Fut, Op>(&self, dependency: Dependency, mut operation: Op) -> RetryReport<T>
    where
        T: Send,
        Fut: Future<Output = Result<T, UpstreamError>> + Send,
        Op: FnMut(u32) -> Fut + Send,
    {
        let mut state = RetryState::default();

        loop {
            let attempt = state.begin_attempt();
            let error = match operation(attempt).await {
                Ok(value) => {
                    if let Some(previous) = &state.last_error {
                        tracing::info!(
                            dependency = %dependency,
                            attempts = attempt,
                            previous_error = %previous,
                            "upstream recovered after retry"
                        );
                    }
                    return RetryReport { result: Ok(value), attempts: attempt };
                }
                Err(error) => error,
            };

            if (self.classifier)(&error) == Classification::Terminal {
                tracing::debug!(
                    dependency = %dependency,
                    attempt,
                    error = %error,
                    "terminal upstream failure, not retrying"
                );
                return RetryReport { result: Err(error), attempts: attempt };
            }

            if attempt >= self.max_attempts {
                tracing::warn!(
                    dependency = %dependency,
                    attempts = attempt,
                    error = %error,
                    "retry budget exhausted"
                );
                self.telemetry
                    .emit(TelemetryRecord::retry_exhausted(
                        self.telemetry.now(),
                        dependency,
                        attempt,
                        &error,
                    ))
                    .await;
                return RetryReport {
                    result: Err(UpstreamError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(error),
                    }),
                    attempts: attempt,
                };
            }

            let delay = self.delay_after(attempt, &error);
            tracing::warn!(
                dependency = %dependency,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying upstream call"
            );
            self.telemetry
                .emit(TelemetryRecord::retry_scheduled(
                    self.telemetry.now(),
                    dependency,
                    attempt,
                    delay,
                    &error,
                ))
                .await;
            state.schedule(error, delay);
            self.sleeper.sleep(state.next_delay).await;
        }
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    classifier: Arc<Classifier>,
    sleeper: Arc<dyn Sleeper>,
    telemetry: Telemetry,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    InvalidMaxAttempts(u32),
    /// Base delay and cap do not form a valid schedule.
    InvalidBackoff(BackoffError),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::InvalidMaxAttempts(n) => {
                write!(f, "max_attempts must be > 0 (got {})", n)
            }
            BuildError::InvalidBackoff(err) => write!(f, "invalid backoff: {}", err),
        }
    }
}

impl std::error::Error for BuildError {}

impl RetryPolicyBuilder {
    /// Defaults: 3 attempts, 1s base, 10s cap, default classifier, tokio sleeper, no telemetry.
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            classifier: Arc::new(classify),
            sleeper: Arc::new(TokioSleeper),
            telemetry: Telemetry::disabled(),
        }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Replace the default classifier.
    pub fn classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&UpstreamError) -> Classification + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        let backoff = Backoff::exponential(self.base_delay)
            .with_max(self.max_delay)
            .map_err(BuildError::InvalidBackoff)?;
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff,
            classifier: self.classifier,
            sleeper: self.sleeper,
            telemetry: self.telemetry,
        })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
