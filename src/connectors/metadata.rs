//! Remote metadata provider connector.
//!
//! [`MetadataSource`] performs one network attempt; [`MetadataConnector`] runs it under the
//! retry policy, shapes the provider body into the gateway payload and reports every attempt
//! to telemetry.

use super::Connector;
use crate::error::{GatewayError, UpstreamError};
use crate::outcome::{Dependency, LookupKey, UpstreamOutcome};
use crate::retry::RetryPolicy;
use crate::telemetry::{Telemetry, TelemetryRecord};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Provider used when the configuration names none.
pub const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2";

/// One attempt against the metadata provider.
#[async_trait]
pub trait MetadataSource: Send + Sync + std::fmt::Debug {
    /// Label written into the payload's `source` field.
    fn name(&self) -> &str;

    /// Fetch the raw provider body for `key`. Exactly one upstream attempt, no retries.
    async fn lookup(&self, key: &LookupKey) -> Result<Value, UpstreamError>;
}

/// `MetadataSource` speaking HTTP to a PokeAPI-compatible provider.
#[derive(Debug, Clone)]
pub struct HttpMetadataSource {
    client: reqwest::Client,
    base_url: String,
    name: String,
}

impl HttpMetadataSource {
    /// Build a source with its own client. `timeout` bounds each request end to end.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let name = reqwest::Url::parse(&base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| base_url.clone());
        Self { client, base_url, name }
    }

    pub fn url_for(&self, key: &LookupKey) -> String {
        format!("{}/pokemon/{}", self.base_url, key)
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, key: &LookupKey) -> Result<Value, UpstreamError> {
        let response = self.client.get(self.url_for(key)).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, parse_retry_after(response.headers())));
        }
        let body = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&body).map_err(|err| UpstreamError::TerminalClient {
            message: format!("undecodable metadata body: {err}"),
            status: Some(status.as_u16()),
        })
    }
}

/// Map a non-success provider status onto the failure taxonomy.
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> UpstreamError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return UpstreamError::rate_limited(retry_after);
    }
    let message = format!("metadata provider returned HTTP {}", status.as_u16());
    if status.is_server_error() {
        UpstreamError::TransientNetwork { message, status: Some(status.as_u16()) }
    } else {
        UpstreamError::TerminalClient { message, status: Some(status.as_u16()) }
    }
}

/// `Retry-After` in its integer-seconds form. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_builder() {
        return UpstreamError::terminal(format!("could not build metadata request: {err}"));
    }
    let message = if err.is_timeout() {
        format!("metadata request timed out: {err}")
    } else if err.is_connect() {
        format!("could not connect to metadata provider: {err}")
    } else {
        format!("metadata request failed: {err}")
    };
    UpstreamError::TransientNetwork { message, status: err.status().map(|s| s.as_u16()) }
}

/// Reduce a provider body to the fields the gateway publishes.
pub fn shape_payload(source: &str, body: &Value) -> Result<Value, UpstreamError> {
    let sprites = body
        .get("sprites")
        .and_then(Value::as_object)
        .ok_or_else(|| UpstreamError::terminal("metadata body has no sprites object"))?;
    let field = |name: &str| body.get(name).cloned().unwrap_or(Value::Null);
    Ok(json!({
        "stats": body.get("stats").cloned().unwrap_or_else(|| json!([])),
        "sprite_image": sprites.get("front_default").cloned().unwrap_or(Value::Null),
        "source": source,
        "pokemon_id": field("id"),
        "height": field("height"),
        "weight": field("weight"),
    }))
}

/// Connector for the remote metadata provider. The only connector that retries.
#[derive(Debug, Clone)]
pub struct MetadataConnector {
    source: Arc<dyn MetadataSource>,
    retry: RetryPolicy,
    telemetry: Telemetry,
}

impl MetadataConnector {
    pub fn new<S>(source: S, retry: RetryPolicy, telemetry: Telemetry) -> Self
    where
        S: MetadataSource + 'static,
    {
        Self::from_arc(Arc::new(source), retry, telemetry)
    }

    pub fn from_arc(source: Arc<dyn MetadataSource>, retry: RetryPolicy, telemetry: Telemetry) -> Self {
        Self { source, retry, telemetry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

#[async_trait]
impl Connector for MetadataConnector {
    fn dependency(&self) -> Dependency {
        Dependency::Metadata
    }

    async fn fetch(&self, key: &LookupKey) -> UpstreamOutcome {
        let started = Instant::now();
        let source = &self.source;
        let telemetry = &self.telemetry;

        let report = self
            .retry
            .execute(Dependency::Metadata, |attempt| async move {
                let attempt_started = Instant::now();
                let result = match source.lookup(key).await {
                    Ok(body) => shape_payload(source.name(), &body),
                    Err(err) => Err(err),
                };
                let (status, message) = match &result {
                    Ok(_) => (200, format!("fetched metadata for {key}")),
                    Err(err) => (err.status().unwrap_or(0), err.to_string()),
                };
                tracing::debug!(dependency = "api_data", %key, attempt, status, "metadata attempt finished");
                telemetry
                    .emit(TelemetryRecord::attempt(
                        telemetry.now(),
                        Dependency::Metadata,
                        attempt,
                        status,
                        attempt_started.elapsed(),
                        message,
                    ))
                    .await;
                result
            })
            .await;

        match report.result {
            Ok(payload) => {
                UpstreamOutcome::success(Dependency::Metadata, payload, report.attempts, started.elapsed())
            }
            Err(err) => {
                UpstreamOutcome::failure(Dependency::Metadata, err, report.attempts, started.elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sleeper::InstantSleeper;
    use crate::telemetry::{MemorySink, RecordKind};
    use reqwest::header::HeaderValue;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Scripted(Mutex<VecDeque<Result<Value, UpstreamError>>>);

    impl Scripted {
        fn new(script: Vec<Result<Value, UpstreamError>>) -> Self {
            Self(Mutex::new(script.into()))
        }
    }

    #[async_trait]
    impl MetadataSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn lookup(&self, _key: &LookupKey) -> Result<Value, UpstreamError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(UpstreamError::transient("script exhausted")))
        }
    }

    fn pikachu() -> Value {
        json!({
            "id": 25,
            "height": 4,
            "weight": 60,
            "stats": [{"base_stat": 35, "stat": {"name": "hp"}}],
            "sprites": {"front_default": "https://img.example/25.png"}
        })
    }

    fn connector(script: Vec<Result<Value, UpstreamError>>, sink: MemorySink) -> MetadataConnector {
        let telemetry = Telemetry::new(sink);
        let retry = RetryPolicy::builder()
            .with_sleeper(InstantSleeper)
            .with_telemetry(telemetry.clone())
            .build()
            .unwrap();
        MetadataConnector::new(Scripted::new(script), retry, telemetry)
    }

    #[test]
    fn status_classification() {
        let rate = classify_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(2)));
        assert_eq!(rate.kind(), ErrorKind::RateLimit);
        assert_eq!(rate.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY, None).kind(), ErrorKind::TransientNetwork);
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE, None).status(), Some(503));
        assert_eq!(classify_status(StatusCode::NOT_FOUND, None).kind(), ErrorKind::TerminalClient);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST, None).kind(), ErrorKind::TerminalClient);
    }

    #[test]
    fn retry_after_accepts_only_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 7 "));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn payload_is_reduced_to_published_fields() {
        let payload = shape_payload("pokeapi.co", &pikachu()).unwrap();
        assert_eq!(payload["pokemon_id"], 25);
        assert_eq!(payload["sprite_image"], "https://img.example/25.png");
        assert_eq!(payload["source"], "pokeapi.co");
        assert_eq!(payload["stats"][0]["base_stat"], 35);
        assert!(payload.get("sprites").is_none());
    }

    #[test]
    fn body_without_sprites_is_terminal() {
        let err = shape_payload("pokeapi.co", &json!({"id": 1})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TerminalClient);
    }

    #[test]
    fn source_name_is_provider_host() {
        let source =
            HttpMetadataSource::new("https://pokeapi.co/api/v2/", Duration::from_secs(1)).unwrap();
        assert_eq!(source.name(), "pokeapi.co");
        let key = LookupKey::parse("Eevee").unwrap();
        assert_eq!(source.url_for(&key), "https://pokeapi.co/api/v2/pokemon/eevee");
    }

    #[tokio::test]
    async fn success_records_one_attempt() {
        let sink = MemorySink::new();
        let connector = connector(vec![Ok(pikachu())], sink.clone());
        let key = LookupKey::parse("pikachu").unwrap();

        let outcome = connector.fetch(&key).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(outcome.payload().unwrap()["source"], "scripted");
        let attempts = sink.of_kind(RecordKind::Attempt);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status_code, 200);
        assert_eq!(attempts[0].service, "poke_api");
    }

    #[tokio::test]
    async fn rate_limits_are_retried_until_success() {
        let sink = MemorySink::new();
        let connector = connector(
            vec![
                Err(UpstreamError::rate_limited(None)),
                Err(UpstreamError::rate_limited(None)),
                Ok(pikachu()),
            ],
            sink.clone(),
        );
        let key = LookupKey::parse("pikachu").unwrap();

        let outcome = connector.fetch(&key).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(outcome.retries(), 2);
        let statuses: Vec<u16> =
            sink.of_kind(RecordKind::Attempt).iter().map(|r| r.status_code).collect();
        assert_eq!(statuses, vec![429, 429, 200]);
        assert_eq!(sink.of_kind(RecordKind::RetryScheduled).len(), 2);
    }

    #[tokio::test]
    async fn not_found_fails_without_retry() {
        let sink = MemorySink::new();
        let connector = connector(
            vec![Err(classify_status(StatusCode::NOT_FOUND, None)), Ok(pikachu())],
            sink.clone(),
        );
        let key = LookupKey::parse("invalidpokemon123").unwrap();

        let outcome = connector.fetch(&key).await;

        assert_eq!(outcome.attempts(), 1);
        assert_eq!(outcome.error().unwrap().kind(), ErrorKind::TerminalClient);
        assert!(sink.of_kind(RecordKind::RetryScheduled).is_empty());
    }

    #[tokio::test]
    async fn persistent_outage_exhausts_retries() {
        let sink = MemorySink::new();
        let connector = connector(vec![], sink.clone());
        let key = LookupKey::parse("pikachu").unwrap();

        let outcome = connector.fetch(&key).await;

        assert_eq!(outcome.attempts(), connector.retry_policy().max_attempts());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(outcome.error().unwrap().kind(), ErrorKind::RetriesExhausted);
        assert_eq!(sink.of_kind(RecordKind::Attempt).len(), 3);
        assert_eq!(sink.of_kind(RecordKind::RetryExhausted).len(), 1);
    }
}
