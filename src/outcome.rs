//! Request and outcome types shared by the connectors, the orchestrator and the composer.

use crate::error::{GatewayError, UpstreamError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const MAX_KEY_LEN: usize = 64;

/// Milliseconds rounded to two decimals, the unit every latency is reported in.
pub fn latency_ms(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 100_000.0).round() / 100.0
}

/// The three upstream collaborators of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependency {
    /// Remote metadata provider.
    Metadata,
    /// Local structured-data table.
    Stats,
    /// Local asset store.
    Assets,
}

impl Dependency {
    /// Every dependency, in response order.
    pub const ALL: [Dependency; 3] = [Dependency::Metadata, Dependency::Stats, Dependency::Assets];

    /// Field naming this dependency in the aggregate response.
    pub fn field_name(&self) -> &'static str {
        match self {
            Dependency::Metadata => "api_data",
            Dependency::Stats => "stats_data",
            Dependency::Assets => "images",
        }
    }

    /// Service label used in telemetry records.
    pub fn service(&self) -> &'static str {
        match self {
            Dependency::Metadata => "poke_api",
            Dependency::Stats => "poke_stats",
            Dependency::Assets => "poke_images",
        }
    }

    /// Endpoint label used in telemetry records.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Dependency::Metadata => "/api/search",
            Dependency::Stats => "/stats/search",
            Dependency::Assets => "/images/search",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Trimmed and lower-cased. Lookup keys and stats table names go through the same function.
pub(crate) fn normalise_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalised lookup key: trimmed, lower-cased, and safe to use as a path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey(Arc<str>);

impl LookupKey {
    /// Accepts any name that is safe as a single path segment and URL segment. Interior
    /// spaces and non-ASCII letters are kept.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let normalised = normalise_key(raw);
        let reject = |reason| Err(GatewayError::InvalidKey { key: raw.to_string(), reason });
        if normalised.is_empty() {
            return reject("key is empty");
        }
        if normalised.len() > MAX_KEY_LEN {
            return reject("key is longer than 64 bytes");
        }
        if normalised.starts_with('.') || normalised.contains("..") {
            return reject("key looks like a path");
        }
        let forbidden = |c: char| c.is_control() || matches!(c, '/' | '\\' | '?' | '#' | '%');
        if normalised.chars().any(forbidden) {
            return reject("key contains unsupported characters");
        }
        Ok(Self(normalised.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inbound lookup. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    key: LookupKey,
    requested_at: DateTime<Utc>,
}

impl SearchRequest {
    pub fn new(key: LookupKey, requested_at: DateTime<Utc>) -> Self {
        Self { key, requested_at }
    }

    pub fn key(&self) -> &LookupKey {
        &self.key
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}

/// Result of one connector call.
///
/// Built only through [`UpstreamOutcome::success`] and [`UpstreamOutcome::failure`]; immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamOutcome {
    dependency: Dependency,
    result: Result<Value, UpstreamError>,
    attempts: u32,
    latency: Duration,
}

impl UpstreamOutcome {
    pub fn success(dependency: Dependency, payload: Value, attempts: u32, latency: Duration) -> Self {
        Self { dependency, result: Ok(payload), attempts, latency }
    }

    pub fn failure(
        dependency: Dependency,
        error: UpstreamError,
        attempts: u32,
        latency: Duration,
    ) -> Self {
        Self { dependency, result: Err(error), attempts, latency }
    }

    pub fn dependency(&self) -> Dependency {
        self.dependency
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn payload(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&UpstreamError> {
        self.result.as_ref().err()
    }

    /// Upstream attempts made, including the first one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempts beyond the first.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }
}

/// Exactly one outcome per dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcomes {
    metadata: UpstreamOutcome,
    stats: UpstreamOutcome,
    assets: UpstreamOutcome,
}

impl Outcomes {
    /// Rejects an outcome filed under the wrong dependency: that can only be a wiring defect.
    pub fn new(
        metadata: UpstreamOutcome,
        stats: UpstreamOutcome,
        assets: UpstreamOutcome,
    ) -> Result<Self, GatewayError> {
        for (slot, outcome) in Dependency::ALL.iter().zip([&metadata, &stats, &assets]) {
            if outcome.dependency() != *slot {
                return Err(GatewayError::Internal(format!(
                    "outcome for {} delivered in the {} slot",
                    outcome.dependency(),
                    slot
                )));
            }
        }
        Ok(Self { metadata, stats, assets })
    }

    pub fn get(&self, dependency: Dependency) -> &UpstreamOutcome {
        match dependency {
            Dependency::Metadata => &self.metadata,
            Dependency::Stats => &self.stats,
            Dependency::Assets => &self.assets,
        }
    }

    /// Outcomes in response order.
    pub fn iter(&self) -> impl Iterator<Item = &UpstreamOutcome> {
        [&self.metadata, &self.stats, &self.assets].into_iter()
    }

    pub fn success_count(&self) -> usize {
        self.iter().filter(|outcome| outcome.is_success()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_trimmed_and_lower_cased() {
        let key = LookupKey::parse("  PikaChu ").unwrap();
        assert_eq!(key.as_str(), "pikachu");
        assert_eq!(LookupKey::parse("mr-mime").unwrap().as_str(), "mr-mime");
        assert_eq!(LookupKey::parse("farfetch'd").unwrap().as_str(), "farfetch'd");
    }

    #[test]
    fn spaces_and_unicode_letters_are_kept() {
        assert_eq!(LookupKey::parse(" Mr. Mime ").unwrap().as_str(), "mr. mime");
        assert_eq!(LookupKey::parse("Nidoran♀").unwrap().as_str(), "nidoran♀");
        assert_eq!(LookupKey::parse("Flabébé").unwrap().as_str(), "flabébé");
    }

    #[test]
    fn path_like_and_empty_keys_are_rejected() {
        for raw in ["", "   ", "../secrets", ".hidden", "a/b", "a\\b", "a?b", "a#b", "50%", "tab\there", "nul\0"] {
            assert!(
                matches!(LookupKey::parse(raw), Err(GatewayError::InvalidKey { .. })),
                "{raw:?} should be rejected"
            );
        }
        assert!(LookupKey::parse(&"x".repeat(65)).is_err());
    }

    #[test]
    fn latency_is_rounded_to_hundredths() {
        assert_eq!(latency_ms(Duration::from_micros(1_234_567)), 1234.57);
        assert_eq!(latency_ms(Duration::ZERO), 0.0);
    }

    #[test]
    fn retries_never_go_negative() {
        let outcome =
            UpstreamOutcome::success(Dependency::Stats, json!({}), 0, Duration::from_millis(1));
        assert_eq!(outcome.retries(), 0);
        let outcome = UpstreamOutcome::failure(
            Dependency::Metadata,
            UpstreamError::transient("reset"),
            3,
            Duration::from_millis(1),
        );
        assert_eq!(outcome.retries(), 2);
        assert!(!outcome.is_success());
        assert!(outcome.payload().is_none());
    }

    #[test]
    fn outcomes_reject_misfiled_dependency() {
        let ok = |dep| UpstreamOutcome::success(dep, json!({}), 1, Duration::ZERO);
        let err = Outcomes::new(ok(Dependency::Stats), ok(Dependency::Stats), ok(Dependency::Assets))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Internal(_)));

        let outcomes =
            Outcomes::new(ok(Dependency::Metadata), ok(Dependency::Stats), ok(Dependency::Assets))
                .unwrap();
        assert_eq!(outcomes.success_count(), 3);
        assert_eq!(outcomes.get(Dependency::Assets).dependency(), Dependency::Assets);
    }
}
