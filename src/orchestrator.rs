//! Fan-out/fan-in orchestration.
//!
//! [`Gateway::aggregate`] runs the three connectors as three spawned tasks and waits for all of
//! them. A failing dependency never cancels its siblings; it only shows up as a failed outcome.
//! A task that dies without producing an outcome is a gateway defect and fails the whole
//! request. Dropping the aggregate future aborts whichever tasks are still running.

use crate::compose::{compose, internal_failure, AggregateResult};
use crate::config::GatewayConfig;
use crate::connectors::{
    AssetConnector, Connector, HttpMetadataSource, MetadataConnector, StatsConnector, StatsTable,
};
use crate::error::GatewayError;
use crate::outcome::{Dependency, LookupKey, Outcomes, SearchRequest, UpstreamOutcome};
use crate::telemetry::{Telemetry, TelemetryRecord};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

/// The aggregation gateway. Cheap to clone; clones share connectors.
#[derive(Debug, Clone)]
pub struct Gateway {
    metadata: Arc<dyn Connector>,
    stats: Arc<dyn Connector>,
    assets: Arc<dyn Connector>,
    telemetry: Telemetry,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    /// Production wiring: HTTP metadata provider, CSV stats table, filesystem assets.
    pub fn from_config(config: &GatewayConfig, telemetry: Telemetry) -> Result<Self, GatewayError> {
        config.validate()?;
        let source = HttpMetadataSource::new(config.metadata.base_url.clone(), config.request_timeout())?;
        let retry = config.retry_policy(telemetry.clone())?;
        let table = StatsTable::from_csv_path(&config.stats.csv_path, &config.stats.name_column)?;
        let assets = AssetConnector::new(config.assets.root.clone(), telemetry.clone())
            .with_public_prefix(config.assets.public_prefix.clone())
            .with_extension(config.assets.extension.clone());

        Self::builder()
            .metadata(MetadataConnector::new(source, retry, telemetry.clone()))
            .stats(StatsConnector::new(Arc::new(table), telemetry.clone()))
            .assets(assets)
            .telemetry(telemetry)
            .build()
    }

    /// Normalise `raw` and aggregate it, stamping the request with the telemetry clock.
    pub async fn search(&self, raw: &str) -> Result<AggregateResult, GatewayError> {
        let key = LookupKey::parse(raw)?;
        let request = SearchRequest::new(key, self.telemetry.now());
        Ok(self.aggregate(&request).await)
    }

    /// Query every dependency concurrently and compose the results.
    pub async fn aggregate(&self, request: &SearchRequest) -> AggregateResult {
        let started = Instant::now();
        let key = request.key();
        tracing::debug!(%key, "aggregate started");

        let spawn = |connector: &Arc<dyn Connector>| {
            let connector = Arc::clone(connector);
            let key = key.clone();
            ScopedTask(tokio::spawn(async move { connector.fetch(&key).await }))
        };
        let (metadata, stats, assets) =
            tokio::join!(spawn(&self.metadata), spawn(&self.stats), spawn(&self.assets));

        let result = match collect(metadata, stats, assets) {
            Ok(outcomes) => compose(request, outcomes, started.elapsed()),
            Err(err) => {
                tracing::error!(%key, error = %err, "aggregate aborted");
                internal_failure(request, err.to_string(), started.elapsed())
            }
        };

        tracing::info!(
            %key,
            status = %result.status(),
            success_rate = %result.summary().success_rate,
            retries = result.summary().total_retry_attempts,
            total_ms = crate::outcome::latency_ms(result.total()),
            "aggregate finished"
        );
        self.telemetry
            .emit(TelemetryRecord::request(
                self.telemetry.now(),
                key,
                result.status_code(),
                result.total(),
                format!("{} ({})", result.status(), result.summary().success_rate),
            ))
            .await;
        result
    }
}

/// Connector task that is aborted when its handle is dropped.
struct ScopedTask(JoinHandle<UpstreamOutcome>);

impl Future for ScopedTask {
    type Output = Result<UpstreamOutcome, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn collect(
    metadata: Result<UpstreamOutcome, JoinError>,
    stats: Result<UpstreamOutcome, JoinError>,
    assets: Result<UpstreamOutcome, JoinError>,
) -> Result<Outcomes, GatewayError> {
    Outcomes::new(
        metadata.map_err(|err| task_failed(Dependency::Metadata, err))?,
        stats.map_err(|err| task_failed(Dependency::Stats, err))?,
        assets.map_err(|err| task_failed(Dependency::Assets, err))?,
    )
}

fn task_failed(dependency: Dependency, err: JoinError) -> GatewayError {
    let how = if err.is_panic() { "panicked" } else { "was cancelled" };
    GatewayError::Internal(format!("{dependency} task {how}"))
}

/// Assembles a [`Gateway`] from three connectors, one per dependency slot.
#[derive(Default)]
pub struct GatewayBuilder {
    metadata: Option<Arc<dyn Connector>>,
    stats: Option<Arc<dyn Connector>>,
    assets: Option<Arc<dyn Connector>>,
    telemetry: Telemetry,
}

impl GatewayBuilder {
    pub fn metadata<C: Connector + 'static>(self, connector: C) -> Self {
        self.metadata_arc(Arc::new(connector))
    }

    pub fn stats<C: Connector + 'static>(self, connector: C) -> Self {
        self.stats_arc(Arc::new(connector))
    }

    pub fn assets<C: Connector + 'static>(self, connector: C) -> Self {
        self.assets_arc(Arc::new(connector))
    }

    pub fn metadata_arc(mut self, connector: Arc<dyn Connector>) -> Self {
        self.metadata = Some(connector);
        self
    }

    pub fn stats_arc(mut self, connector: Arc<dyn Connector>) -> Self {
        self.stats = Some(connector);
        self
    }

    pub fn assets_arc(mut self, connector: Arc<dyn Connector>) -> Self {
        self.assets = Some(connector);
        self
    }

    /// Handle for the per-request record. Connectors carry their own handles.
    pub fn telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Fails when a slot is empty or holds a connector for another dependency.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        Ok(Gateway {
            metadata: slot(self.metadata, Dependency::Metadata)?,
            stats: slot(self.stats, Dependency::Stats)?,
            assets: slot(self.assets, Dependency::Assets)?,
            telemetry: self.telemetry,
        })
    }
}

fn slot(
    connector: Option<Arc<dyn Connector>>,
    expected: Dependency,
) -> Result<Arc<dyn Connector>, GatewayError> {
    let connector =
        connector.ok_or_else(|| GatewayError::Config(format!("no connector for {expected}")))?;
    if connector.dependency() != expected {
        return Err(GatewayError::Config(format!(
            "{} connector installed in the {expected} slot",
            connector.dependency()
        )));
    }
    Ok(connector)
}
