//! Concurrent requests must never share retry bookkeeping.

mod common;

use common::{provider_body, StubSource, STATS_CSV};
use pokegate::telemetry::{MemorySink, RecordKind};
use pokegate::{
    AssetConnector, Dependency, ErrorKind, Gateway, MetadataConnector, OverallStatus,
    RetryPolicy, StatsConnector, StatsTable, Telemetry, UpstreamError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn gateway(source: StubSource, sink: MemorySink) -> Gateway {
    let telemetry = Telemetry::new(sink);
    // Real tokio sleeps; the paused clock advances through them.
    let retry = RetryPolicy::builder().with_telemetry(telemetry.clone()).build().unwrap();
    let table = StatsTable::from_csv_reader(STATS_CSV.as_bytes(), "Name").unwrap();
    Gateway::builder()
        .metadata(MetadataConnector::new(source, retry, telemetry.clone()))
        .stats(StatsConnector::new(Arc::new(table), telemetry.clone()))
        .assets(AssetConnector::new("/nonexistent/pokegate-assets", telemetry.clone()))
        .telemetry(telemetry)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_each_spend_their_own_budget() {
    const REQUESTS: usize = 16;
    let source = StubSource::new(|_, _| Err(UpstreamError::transient("connection reset")));
    let sink = MemorySink::new();
    let gateway = Arc::new(gateway(source.clone(), sink.clone()));

    let started = Instant::now();
    let handles: Vec<_> = (0..REQUESTS)
        .map(|n| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.search(&format!("pokemon-{n}")).await.unwrap() })
        })
        .collect();
    let results = futures::future::join_all(handles).await;

    for result in results {
        let result = result.unwrap();
        let metadata = result.outcomes().unwrap().get(Dependency::Metadata);
        assert_eq!(metadata.attempts(), 3, "{}", result.key());
        assert_eq!(metadata.error().unwrap().kind(), ErrorKind::RetriesExhausted);
        assert_eq!(result.status(), OverallStatus::Partial);
    }
    for n in 0..REQUESTS {
        assert_eq!(source.calls(&format!("pokemon-{n}")), 3);
    }
    assert_eq!(sink.of_kind(RecordKind::RetryScheduled).len(), REQUESTS * 2);
    assert_eq!(sink.of_kind(RecordKind::RetryExhausted).len(), REQUESTS);
    // Backoff waits overlap: 1s + 2s once, not once per request.
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn a_flaky_key_does_not_consume_another_keys_attempts() {
    let source = StubSource::new(|key, call| match key {
        "pikachu" if call < 2 => Err(UpstreamError::rate_limited(Some(Duration::from_secs(3)))),
        "pikachu" => Ok(provider_body(key)),
        _ => Err(UpstreamError::transient("connection reset")),
    });
    let gateway = gateway(source.clone(), MemorySink::new());

    let (flaky, broken) = tokio::join!(gateway.search("pikachu"), gateway.search("eevee"));

    let flaky = flaky.unwrap();
    let broken = broken.unwrap();
    assert_eq!(flaky.outcomes().unwrap().get(Dependency::Metadata).attempts(), 2);
    assert_eq!(broken.outcomes().unwrap().get(Dependency::Metadata).attempts(), 3);
    assert_eq!(source.calls("pikachu"), 2);
    assert_eq!(source.calls("eevee"), 3);
}
