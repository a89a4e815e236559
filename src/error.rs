//! Error taxonomy for upstream calls and for the gateway itself.
//!
//! [`UpstreamError`] describes why one dependency call failed. It is always captured into an
//! [`UpstreamOutcome`](crate::UpstreamOutcome) and never escapes a connector. [`GatewayError`]
//! covers everything else: bad input at the boundary, bad configuration, and defects in the
//! gateway's own orchestration.
use crate::backoff::BackoffError;
use crate::retry::BuildError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Classification tag carried by every upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Connection, timeout or 5xx failure. Retryable.
    #[serde(rename = "TransientNetworkError")]
    TransientNetwork,
    /// HTTP 429. Retryable, may carry a wait hint.
    #[serde(rename = "RateLimitError")]
    RateLimit,
    /// Not-found, bad request, malformed payload. Never retried.
    #[serde(rename = "TerminalClientError")]
    TerminalClient,
    /// Bounded attempts spent on transient failures.
    #[serde(rename = "RetriesExhausted")]
    RetriesExhausted,
    /// Defect inside the gateway.
    #[serde(rename = "InternalError")]
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientNetwork => "TransientNetworkError",
            ErrorKind::RateLimit => "RateLimitError",
            ErrorKind::TerminalClient => "TerminalClientError",
            ErrorKind::RetriesExhausted => "RetriesExhausted",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single upstream call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("transient network error: {message}")]
    TransientNetwork { message: String, status: Option<u16> },
    #[error("rate limited: {message}")]
    RateLimit { message: String, retry_after: Option<Duration> },
    #[error("terminal client error: {message}")]
    TerminalClient { message: String, status: Option<u16> },
    #[error("retries exhausted after {attempts} attempts; last error: {last}")]
    RetriesExhausted { attempts: u32, last: Box<UpstreamError> },
    #[error("internal error: {0}")]
    Internal(String),
}

impl UpstreamError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientNetwork { message: message.into(), status: None }
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        let message = match retry_after {
            Some(hint) => format!("upstream returned 429, retry after {}s", hint.as_secs()),
            None => "upstream returned 429".to_string(),
        };
        Self::RateLimit { message, retry_after }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::TerminalClient { message: message.into(), status: None }
    }

    /// Classification tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TransientNetwork { .. } => ErrorKind::TransientNetwork,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::TerminalClient { .. } => ErrorKind::TerminalClient,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Upstream HTTP status, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TransientNetwork { status, .. } | Self::TerminalClient { status, .. } => *status,
            Self::RateLimit { .. } => Some(429),
            Self::RetriesExhausted { last, .. } => last.status(),
            Self::Internal(_) => None,
        }
    }

    /// Wait hint supplied by a rate-limiting upstream.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The error that ended a retry chain, or `self` when no retries were spent.
    pub fn last_error(&self) -> &UpstreamError {
        match self {
            Self::RetriesExhausted { last, .. } => last.last_error(),
            other => other,
        }
    }
}

/// Failures outside any single dependency call.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid lookup key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read configuration from {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("failed to load stats table from {path}: {source}")]
    StatsLoad {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("stats table has no {0:?} column")]
    MissingColumn(String),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("invalid retry policy: {0}")]
    Retry(#[from] BuildError),
    #[error("invalid backoff: {0}")]
    Backoff(#[from] BackoffError),
    #[error("internal gateway error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_with_taxonomy_names() {
        let names: Vec<String> = [
            ErrorKind::TransientNetwork,
            ErrorKind::RateLimit,
            ErrorKind::TerminalClient,
            ErrorKind::RetriesExhausted,
            ErrorKind::Internal,
        ]
        .iter()
        .map(|kind| serde_json::to_value(kind).unwrap().as_str().unwrap().to_string())
        .collect();
        assert_eq!(
            names,
            vec![
                "TransientNetworkError",
                "RateLimitError",
                "TerminalClientError",
                "RetriesExhausted",
                "InternalError"
            ]
        );
    }

    #[test]
    fn rate_limit_reports_429_and_hint() {
        let err = UpstreamError::rate_limited(Some(Duration::from_secs(3)));
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert!(err.to_string().contains("retry after 3s"));
    }

    #[test]
    fn retries_exhausted_display_includes_last_error() {
        let err = UpstreamError::RetriesExhausted {
            attempts: 3,
            last: Box::new(UpstreamError::TransientNetwork {
                message: "connection reset".into(),
                status: Some(503),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("connection reset"));
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.last_error().kind(), ErrorKind::TransientNetwork);
    }

    #[test]
    fn non_rate_limit_errors_have_no_hint() {
        assert!(UpstreamError::transient("reset").retry_after().is_none());
        assert!(UpstreamError::terminal("404").retry_after().is_none());
        assert!(UpstreamError::Internal("bug".into()).status().is_none());
    }

    #[test]
    fn invalid_key_display_names_the_key() {
        let err = GatewayError::InvalidKey { key: "../etc".into(), reason: "path-like" };
        assert!(err.to_string().contains("../etc"));
    }
}
