//! Convenient re-exports for common pokegate types.
pub use crate::{
    backoff::{Backoff, BackoffError, MAX_BACKOFF},
    compose::{AggregateResult, OverallStatus},
    config::GatewayConfig,
    connectors::{Connector, MetadataSource},
    error::{ErrorKind, GatewayError, UpstreamError},
    orchestrator::{Gateway, GatewayBuilder},
    outcome::{Dependency, LookupKey, SearchRequest, UpstreamOutcome},
    retry::{BuildError, Classification, RetryPolicy, RetryPolicyBuilder},
    telemetry::{LogSink, MemorySink, NonBlockingSink, Telemetry, TelemetryRecord},
};
