use crate::error::UpstreamError;
use crate::outcome::{latency_ms, Dependency, LookupKey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Status code written on records for retries that are still in flight.
pub const IN_FLIGHT_STATUS: u16 = 0;

/// Latency written on records for retries that are still in flight.
pub const IN_FLIGHT_LATENCY_MS: f64 = -1.0;

/// Service label of the aggregate request.
pub const GATEWAY_SERVICE: &str = "poke_search";

/// Endpoint label of the aggregate request.
pub const GATEWAY_ENDPOINT: &str = "/poke/search";

/// What a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// One upstream attempt finished (successfully or not).
    Attempt,
    /// A failed attempt will be retried after a backoff delay.
    RetryScheduled,
    /// The retry budget ran out.
    RetryExhausted,
    /// One aggregate request completed.
    Request,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecordKind::Attempt => "Attempt",
            RecordKind::RetryScheduled => "RetryScheduled",
            RecordKind::RetryExhausted => "RetryExhausted",
            RecordKind::Request => "Request",
        };
        f.write_str(label)
    }
}

/// Append-only structured record consumed by telemetry sinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: RecordKind,
    pub service: String,
    pub endpoint: String,
    pub status_code: u16,
    pub latency_ms: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

impl TelemetryRecord {
    /// A finished upstream attempt. `status_code` is 0 when the call never got a response.
    pub fn attempt(
        at: DateTime<Utc>,
        dependency: Dependency,
        attempt: u32,
        status_code: u16,
        latency: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: at,
            kind: RecordKind::Attempt,
            service: dependency.service().to_string(),
            endpoint: dependency.endpoint().to_string(),
            status_code,
            latency_ms: latency_ms(latency),
            message: format!("attempt #{attempt}: {}", message.into()),
            retry_delay_ms: None,
        }
    }

    pub fn retry_scheduled(
        at: DateTime<Utc>,
        dependency: Dependency,
        attempt: u32,
        delay: Duration,
        error: &UpstreamError,
    ) -> Self {
        Self {
            timestamp: at,
            kind: RecordKind::RetryScheduled,
            service: dependency.service().to_string(),
            endpoint: dependency.endpoint().to_string(),
            status_code: IN_FLIGHT_STATUS,
            latency_ms: IN_FLIGHT_LATENCY_MS,
            message: format!("retry #{attempt} in {}ms after {}: {error}", delay.as_millis(), error.kind()),
            retry_delay_ms: Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    pub fn retry_exhausted(
        at: DateTime<Utc>,
        dependency: Dependency,
        attempts: u32,
        error: &UpstreamError,
    ) -> Self {
        Self {
            timestamp: at,
            kind: RecordKind::RetryExhausted,
            service: dependency.service().to_string(),
            endpoint: dependency.endpoint().to_string(),
            status_code: error.status().unwrap_or(IN_FLIGHT_STATUS),
            latency_ms: IN_FLIGHT_LATENCY_MS,
            message: format!("gave up after {attempts} attempts: {error}"),
            retry_delay_ms: None,
        }
    }

    /// A completed aggregate request.
    pub fn request(
        at: DateTime<Utc>,
        key: &LookupKey,
        status_code: u16,
        latency: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: at,
            kind: RecordKind::Request,
            service: GATEWAY_SERVICE.to_string(),
            endpoint: GATEWAY_ENDPOINT.to_string(),
            status_code,
            latency_ms: latency_ms(latency),
            message: format!("{key}: {}", message.into()),
            retry_delay_ms: None,
        }
    }
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({} {} status={} latency={}ms) {}",
            self.kind, self.service, self.endpoint, self.status_code, self.latency_ms, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid timestamp")
    }

    #[test]
    fn retry_records_use_in_flight_sentinels() {
        let err = UpstreamError::rate_limited(None);
        let record =
            TelemetryRecord::retry_scheduled(at(), Dependency::Metadata, 1, Duration::from_secs(2), &err);
        assert_eq!(record.status_code, IN_FLIGHT_STATUS);
        assert_eq!(record.latency_ms, IN_FLIGHT_LATENCY_MS);
        assert_eq!(record.retry_delay_ms, Some(2000));
        assert_eq!(record.service, "poke_api");
        assert!(record.message.contains("RateLimitError"));
    }

    #[test]
    fn request_record_names_the_gateway() {
        let key = LookupKey::parse("pikachu").unwrap();
        let record = TelemetryRecord::request(at(), &key, 207, Duration::from_millis(12), "partial");
        assert_eq!(record.service, GATEWAY_SERVICE);
        assert_eq!(record.endpoint, GATEWAY_ENDPOINT);
        assert_eq!(record.latency_ms, 12.0);
        assert!(record.to_string().starts_with("Request(poke_search /poke/search status=207"));
    }

    #[test]
    fn record_serializes_with_interface_fields() {
        let record = TelemetryRecord::attempt(
            at(),
            Dependency::Assets,
            1,
            200,
            Duration::from_millis(3),
            "found 2 images",
        );
        let value = serde_json::to_value(&record).unwrap();
        for field in ["timestamp", "service", "endpoint", "status_code", "latency_ms", "message"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["kind"], "attempt");
        assert!(value.get("retry_delay_ms").is_none());
    }
}
