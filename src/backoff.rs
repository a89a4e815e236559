//! Backoff schedule for the retry policy.
//!
//! Exponential and deterministic: no jitter is applied, so the same failure sequence always
//! produces the same waits. Attempt semantics: attempt index `0` represents the initial call
//! (no delay); the wait scheduled after failed attempt `n` is `delay(n)`.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use pokegate::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_secs(1))
//!     .with_max(Duration::from_secs(10))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::ZERO); // initial call
//! assert_eq!(backoff.delay(1), Duration::from_secs(1));
//! assert_eq!(backoff.delay(2), Duration::from_secs(2));
//! assert_eq!(backoff.delay(3), Duration::from_secs(4));
//! assert_eq!(backoff.delay(5), Duration::from_secs(10)); // capped
//! ```
//!
//! Overflow behavior: computations that would overflow saturate to `MAX_BACKOFF` (1 day).

use std::fmt;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Base delay used when nothing else is configured (one time unit).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Cap used when nothing else is configured (ten time units).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffError {
    MaxMustBePositive,
    MaxLessThanBase { base: Duration, max: Duration },
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::MaxMustBePositive => write!(f, "max must be greater than zero"),
            BackoffError::MaxLessThanBase { base, max } => {
                write!(f, "max ({:?}) must be >= base ({:?})", max, base)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

/// Exponential backoff `base * 2^(attempt-1)`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Option<Duration>,
}

impl Backoff {
    /// Create an uncapped exponential schedule starting at `base`.
    pub fn exponential(base: Duration) -> Self {
        Self { base, max: None }
    }

    /// Cap every delay at `max`. Rejects a zero cap or a cap below the base.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        if max < self.base {
            return Err(BackoffError::MaxLessThanBase { base: self.base, max });
        }
        self.max = Some(max);
        Ok(self)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Effective cap: the configured maximum, or `MAX_BACKOFF` when uncapped.
    pub fn cap(&self) -> Duration {
        self.max.unwrap_or(MAX_BACKOFF).min(MAX_BACKOFF)
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed; 0 = initial call, no delay).
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let multiplier = 2u128.saturating_pow(attempt - 1);
        let nanos = self.base.as_nanos().saturating_mul(multiplier);
        let exp_delay = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
        exp_delay.min(self.cap())
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self { base: DEFAULT_BASE_DELAY, max: Some(DEFAULT_MAX_DELAY) }
    }
}
