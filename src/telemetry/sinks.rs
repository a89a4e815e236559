use super::records::{RecordKind, TelemetryRecord};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tower::Service;

type SinkFuture<E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send>>;

/// A telemetry sink that consumes gateway records.
///
/// Any `tower::Service<TelemetryRecord>` that is cheap to clone can act as a sink, so sinks
/// compose with ordinary tower combinators.
pub trait TelemetrySink:
    tower::Service<TelemetryRecord, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
///
/// Telemetry never fails a request: if a sink is not ready or returns an error the record is
/// dropped.
pub async fn emit_best_effort<S>(sink: S, record: TelemetryRecord)
where
    S: tower::Service<TelemetryRecord, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        if let Err(err) = ready_sink.call(record).await {
            tracing::debug!(error = %err, "telemetry sink rejected record");
        }
    }
}

/// Discards every record.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<TelemetryRecord> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _record: TelemetryRecord) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// Forwards records to `tracing`: attempts at DEBUG, retries at WARN, requests at INFO.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<TelemetryRecord> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, record: TelemetryRecord) -> Self::Future {
        match record.kind {
            RecordKind::Attempt => tracing::debug!(
                service = %record.service,
                endpoint = %record.endpoint,
                status_code = record.status_code,
                latency_ms = record.latency_ms,
                "{}",
                record.message
            ),
            RecordKind::RetryScheduled | RecordKind::RetryExhausted => tracing::warn!(
                service = %record.service,
                endpoint = %record.endpoint,
                status_code = record.status_code,
                retry_delay_ms = record.retry_delay_ms,
                "{}",
                record.message
            ),
            RecordKind::Request => tracing::info!(
                service = %record.service,
                endpoint = %record.endpoint,
                status_code = record.status_code,
                latency_ms = record.latency_ms,
                "{}",
                record.message
            ),
        }
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// Keeps records in memory; oldest records are evicted past capacity.
#[derive(Clone, Debug)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Bounded sink with the default cap of 10,000 records.
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<TelemetryRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the records received so far.
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.guard().clone()
    }

    /// Records of one kind, in arrival order.
    pub fn of_kind(&self, kind: RecordKind) -> Vec<TelemetryRecord> {
        self.guard().iter().filter(|record| record.kind == kind).cloned().collect()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<TelemetryRecord> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, record: TelemetryRecord) -> Self::Future {
        let mut guard = self.guard();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(record);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}

/// Offloads records to a bounded channel drained by a worker task, so request tasks never wait
/// on a slow sink. Records that do not fit in the queue are dropped and counted.
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct NonBlockingSink {
    tx: tokio::sync::mpsc::Sender<TelemetryRecord>,
    dropped: Arc<AtomicU64>,
}

impl NonBlockingSink {
    pub fn with_capacity<S>(sink: S, capacity: usize) -> Self
    where
        S: tower::Service<TelemetryRecord, Response = ()> + Send + 'static,
        S::Error: std::error::Error + Send + 'static,
        S::Future: Send + 'static,
    {
        let (tx, mut rx) = tokio::sync::mpsc::channel(capacity.max(1));
        let mut sink = sink;
        tokio::spawn(async move {
            use tower::ServiceExt;
            while let Some(record) = rx.recv().await {
                match sink.ready().await {
                    Ok(ready) => {
                        if let Err(err) = ready.call(record).await {
                            tracing::debug!(error = %err, "telemetry worker dropped record");
                        }
                    }
                    Err(err) => tracing::debug!(error = %err, "telemetry sink not ready"),
                }
            }
        });
        Self { tx, dropped: Arc::new(AtomicU64::new(0)) }
    }

    /// Records dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for NonBlockingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonBlockingSink").field("dropped", &self.dropped()).finish()
    }
}

impl Service<TelemetryRecord> for NonBlockingSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, record: TelemetryRecord) -> Self::Future {
        if self.tx.try_send(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NonBlockingSink {
    type SinkError = Infallible;
}

/// Error type for composed telemetry sinks.
#[derive(Debug)]
pub struct ComposedSinkError(Box<dyn std::error::Error + Send + Sync>);

impl std::fmt::Display for ComposedSinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "telemetry sink error: {}", self.0)
    }
}

impl std::error::Error for ComposedSinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.0)
    }
}

/// Sends every record to both sinks concurrently. Fails if either sink fails.
#[derive(Clone, Debug)]
pub struct MulticastSink<A, B> {
    sink_a: A,
    sink_b: B,
}

impl<A, B> MulticastSink<A, B> {
    pub fn new(sink_a: A, sink_b: B) -> Self {
        Self { sink_a, sink_b }
    }
}

impl<A, B> Service<TelemetryRecord> for MulticastSink<A, B>
where
    A: tower::Service<TelemetryRecord, Response = ()> + Clone + Send + 'static,
    A::Error: std::error::Error + Send + Sync + 'static,
    A::Future: Send + 'static,
    B: tower::Service<TelemetryRecord, Response = ()> + Clone + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
    B::Future: Send + 'static,
{
    type Response = ();
    type Error = ComposedSinkError;
    type Future = SinkFuture<Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, record: TelemetryRecord) -> Self::Future {
        let sink_a = self.sink_a.clone();
        let sink_b = self.sink_b.clone();
        let copy = record.clone();

        Box::pin(async move {
            use tower::ServiceExt;
            let (res_a, res_b) = tokio::join!(sink_a.oneshot(record), sink_b.oneshot(copy));
            res_a.map_err(|e| ComposedSinkError(Box::new(e)))?;
            res_b.map_err(|e| ComposedSinkError(Box::new(e)))?;
            Ok(())
        })
    }
}

impl<A, B> TelemetrySink for MulticastSink<A, B>
where
    A: tower::Service<TelemetryRecord, Response = ()> + Clone + Send + 'static,
    A::Error: std::error::Error + Send + Sync + 'static,
    A::Future: Send + 'static,
    B: tower::Service<TelemetryRecord, Response = ()> + Clone + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
    B::Future: Send + 'static,
{
    type SinkError = ComposedSinkError;
}
