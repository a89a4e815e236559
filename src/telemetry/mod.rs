//! Telemetry for the gateway.
//!
//! Every upstream attempt, every scheduled retry and every completed aggregate request produces
//! one [`TelemetryRecord`]. Records flow into a [`TelemetrySink`], which is any
//! `tower::Service<TelemetryRecord>`; sinks can be stacked (`MulticastSink`) or moved off the
//! request path (`NonBlockingSink`).
//!
//! Components do not carry sink type parameters. They hold a [`Telemetry`] handle, which erases
//! the sink type and stamps records with its clock.
//!
//! ```rust
//! use pokegate::telemetry::{MemorySink, RecordKind, Telemetry, TelemetryRecord};
//! use pokegate::Dependency;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = MemorySink::new();
//! let telemetry = Telemetry::new(sink.clone());
//! telemetry
//!     .emit(TelemetryRecord::attempt(
//!         telemetry.now(),
//!         Dependency::Stats,
//!         1,
//!         200,
//!         Duration::from_millis(2),
//!         "found",
//!     ))
//!     .await;
//! assert_eq!(sink.of_kind(RecordKind::Attempt).len(), 1);
//! # }
//! ```

pub mod records;
pub mod sinks;

pub use records::{
    RecordKind, TelemetryRecord, GATEWAY_ENDPOINT, GATEWAY_SERVICE, IN_FLIGHT_LATENCY_MS,
    IN_FLIGHT_STATUS,
};
pub use sinks::{
    emit_best_effort, ComposedSinkError, LogSink, MemorySink, MulticastSink, NonBlockingSink,
    NullSink, TelemetrySink,
};

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::Arc;

type EmitFn = dyn Fn(TelemetryRecord) -> BoxFuture<'static, ()> + Send + Sync;

/// Cloneable, type-erased handle to a telemetry sink plus the clock used for timestamps.
#[derive(Clone)]
pub struct Telemetry {
    emit: Arc<EmitFn>,
    clock: Arc<dyn Clock>,
}

impl Telemetry {
    pub fn new<S>(sink: S) -> Self
    where
        S: TelemetrySink + Sync,
        <S as tower::Service<TelemetryRecord>>::Error: std::error::Error + Send + 'static,
        S::Future: Send + 'static,
    {
        let emit = move |record: TelemetryRecord| -> BoxFuture<'static, ()> {
            Box::pin(emit_best_effort(sink.clone(), record))
        };
        Self { emit: Arc::new(emit), clock: Arc::new(SystemClock) }
    }

    /// Handle that drops every record.
    pub fn disabled() -> Self {
        Self::new(NullSink)
    }

    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Current time according to this handle's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Deliver one record, best effort.
    pub async fn emit(&self, record: TelemetryRecord) {
        (self.emit)(record).await
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").field("clock", &self.clock).field("sink", &"<sink>").finish()
    }
}
