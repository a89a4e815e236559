#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # pokegate
//!
//! Aggregation gateway: one lookup fans out to three independent upstreams, each answer is
//! captured as an outcome, and the outcomes are composed into a single response even when some
//! upstreams fail.
//!
//! ## Features
//!
//! - **Fan-out/fan-in** over three spawned tasks, joined unconditionally
//! - **Bounded retry** with deterministic exponential backoff and rate-limit hints
//! - **Failure taxonomy** separating transient, rate-limited and terminal failures
//! - **Partial-failure composition** into `success` / `partial` / `failure` (200 / 207 / 500)
//! - **Telemetry records** delivered through `tower::Service` sinks
//!
//! ## Quick Start
//!
//! ```rust
//! use pokegate::{
//!     AssetConnector, Gateway, InstantSleeper, MetadataConnector, MetadataSource,
//!     OverallStatus, RetryPolicy, StatsConnector, StatsTable, Telemetry, UpstreamError,
//!     LookupKey,
//! };
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Offline;
//!
//! #[async_trait::async_trait]
//! impl MetadataSource for Offline {
//!     fn name(&self) -> &str {
//!         "offline"
//!     }
//!
//!     async fn lookup(&self, _key: &LookupKey) -> Result<Value, UpstreamError> {
//!         Err(UpstreamError::transient("provider unreachable"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let telemetry = Telemetry::disabled();
//!     let retry = RetryPolicy::builder().with_sleeper(InstantSleeper).build().unwrap();
//!     let table = StatsTable::from_records([("Pikachu", json!({"HP": 35}).as_object().unwrap().clone())]);
//!     let gateway = Gateway::builder()
//!         .metadata(MetadataConnector::new(Offline, retry, telemetry.clone()))
//!         .stats(StatsConnector::new(Arc::new(table), telemetry.clone()))
//!         .assets(AssetConnector::new("/nonexistent", telemetry))
//!         .build()
//!         .unwrap();
//!
//!     let result = gateway.search("pikachu").await.unwrap();
//!     assert_eq!(result.status(), OverallStatus::Partial);
//!     assert_eq!(result.status_code(), 207);
//! }
//! ```

pub mod backoff;
pub mod clock;
pub mod compose;
pub mod config;
pub mod connectors;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod outcome;
pub mod prelude;
pub mod retry;
pub mod sleeper;
pub mod telemetry;

// Re-exports
pub use backoff::{Backoff, BackoffError};
pub use clock::{Clock, FixedClock, SystemClock};
pub use compose::{compose, internal_failure, AggregateResult, FailureDetail, OverallStatus, Summary};
pub use config::GatewayConfig;
pub use connectors::{
    AssetConnector, Connector, HttpMetadataSource, MetadataConnector, MetadataSource,
    StatsConnector, StatsTable,
};
pub use error::{ErrorKind, GatewayError, UpstreamError};
pub use orchestrator::{Gateway, GatewayBuilder};
pub use outcome::{Dependency, LookupKey, Outcomes, SearchRequest, UpstreamOutcome};
pub use retry::{BuildError, Classification, RetryPolicy, RetryPolicyBuilder, RetryReport};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use telemetry::{Telemetry, TelemetryRecord, TelemetrySink};
