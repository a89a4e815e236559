//! Response composition.
//!
//! Turns the three outcomes of one request into an [`AggregateResult`]: overall status,
//! latency breakdown, retry counts, failure details and the summary block. Composition is a
//! pure function of its inputs.

use crate::error::ErrorKind;
use crate::outcome::{latency_ms, Dependency, LookupKey, Outcomes, SearchRequest, UpstreamOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Overall verdict for one aggregate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Success,
    Partial,
    Failure,
}

impl OverallStatus {
    /// All dependencies succeeded: success. None did: failure. Anything in between: partial.
    pub fn from_outcomes(outcomes: &Outcomes) -> Self {
        match outcomes.success_count() {
            n if n == Dependency::ALL.len() => OverallStatus::Success,
            0 => OverallStatus::Failure,
            _ => OverallStatus::Partial,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            OverallStatus::Success => 200,
            OverallStatus::Partial => 207,
            OverallStatus::Failure => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Success => "success",
            OverallStatus::Partial => "partial",
            OverallStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed dependency, as listed in `failure_details`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureDetail {
    pub dependency: &'static str,
    pub service: &'static str,
    pub endpoint: &'static str,
    pub classification: ErrorKind,
    pub message: String,
    pub latency_ms: f64,
    pub attempts: u32,
}

impl FailureDetail {
    fn from_outcome(outcome: &UpstreamOutcome) -> Option<Self> {
        let error = outcome.error()?;
        let dependency = outcome.dependency();
        Some(Self {
            dependency: dependency.field_name(),
            service: dependency.service(),
            endpoint: dependency.endpoint(),
            classification: error.kind(),
            message: error.to_string(),
            latency_ms: latency_ms(outcome.latency()),
            attempts: outcome.attempts(),
        })
    }
}

/// Roll-up block at the end of every response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub success_rate: String,
    pub failed_dependencies: Vec<&'static str>,
    pub total_retry_attempts: u32,
    pub slowest_dependency: Option<&'static str>,
}

/// The composed answer to one request.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    key: LookupKey,
    requested_at: DateTime<Utc>,
    status: OverallStatus,
    outcomes: Option<Outcomes>,
    total: Duration,
    failures: Vec<FailureDetail>,
    summary: Summary,
    internal_error: Option<String>,
}

/// Compose the response for `request` from its three outcomes.
pub fn compose(request: &SearchRequest, outcomes: Outcomes, total: Duration) -> AggregateResult {
    let status = OverallStatus::from_outcomes(&outcomes);
    let failures: Vec<FailureDetail> = outcomes.iter().filter_map(FailureDetail::from_outcome).collect();
    let slowest = outcomes
        .iter()
        .max_by(|a, b| a.latency().cmp(&b.latency()))
        .map(|outcome| outcome.dependency().field_name());
    let summary = Summary {
        success_rate: format!("{}/{}", outcomes.success_count(), Dependency::ALL.len()),
        failed_dependencies: failures.iter().map(|failure| failure.dependency).collect(),
        total_retry_attempts: outcomes.iter().map(UpstreamOutcome::retries).sum(),
        slowest_dependency: slowest,
    };
    AggregateResult {
        key: request.key().clone(),
        requested_at: request.requested_at(),
        status,
        outcomes: Some(outcomes),
        total,
        failures,
        summary,
        internal_error: None,
    }
}

/// Response for a request the gateway could not compose. Carries no partial data.
pub fn internal_failure(
    request: &SearchRequest,
    message: impl Into<String>,
    total: Duration,
) -> AggregateResult {
    AggregateResult {
        key: request.key().clone(),
        requested_at: request.requested_at(),
        status: OverallStatus::Failure,
        outcomes: None,
        total,
        failures: Vec::new(),
        summary: Summary {
            success_rate: format!("0/{}", Dependency::ALL.len()),
            failed_dependencies: Vec::new(),
            total_retry_attempts: 0,
            slowest_dependency: None,
        },
        internal_error: Some(message.into()),
    }
}

impl AggregateResult {
    pub fn key(&self) -> &LookupKey {
        &self.key
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    pub fn status(&self) -> OverallStatus {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.status_code()
    }

    /// `None` only for an internal failure.
    pub fn outcomes(&self) -> Option<&Outcomes> {
        self.outcomes.as_ref()
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn failure_details(&self) -> &[FailureDetail] {
        &self.failures
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn internal_error(&self) -> Option<&str> {
        self.internal_error.as_deref()
    }

    /// Render the response body.
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("name".into(), json!(self.key.as_str()));
        body.insert(
            "search_timestamp".into(),
            json!(self.requested_at.format(TIMESTAMP_FORMAT).to_string()),
        );
        body.insert("status".into(), json!(self.status));

        let mut breakdown = Map::new();
        let mut retries = Map::new();
        for dependency in Dependency::ALL {
            let field = dependency.field_name();
            match &self.outcomes {
                Some(outcomes) => {
                    let outcome = outcomes.get(dependency);
                    body.insert(field.into(), dependency_field(outcome));
                    breakdown.insert(field.into(), json!(latency_ms(outcome.latency())));
                    retries.insert(field.into(), json!(outcome.retries()));
                }
                None => {
                    body.insert(field.into(), Value::Null);
                    breakdown.insert(field.into(), Value::Null);
                    retries.insert(field.into(), Value::Null);
                }
            }
        }

        body.insert(
            "performance".into(),
            json!({
                "total_ms": latency_ms(self.total),
                "breakdown": breakdown,
                "retries": retries,
            }),
        );
        body.insert("failure_details".into(), json!(self.failures));
        body.insert("summary".into(), json!(self.summary));
        if let Some(message) = &self.internal_error {
            body.insert(
                "error".into(),
                json!({ "classification": ErrorKind::Internal, "message": message }),
            );
        }
        Value::Object(body)
    }
}

fn dependency_field(outcome: &UpstreamOutcome) -> Value {
    match (outcome.payload(), outcome.error()) {
        (Some(payload), _) => payload.clone(),
        (None, Some(error)) => json!({
            "error": {
                "classification": error.kind(),
                "message": error.to_string(),
                "status": error.status(),
                "attempts": outcome.attempts(),
            }
        }),
        (None, None) => Value::Null,
    }
}
