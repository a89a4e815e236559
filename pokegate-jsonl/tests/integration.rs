use chrono::{TimeZone, Utc};
use pokegate::telemetry::{NonBlockingSink, Telemetry, TelemetryRecord};
use pokegate::{Dependency, LookupKey, UpstreamError};
use pokegate_jsonl::JsonlSink;
use std::time::Duration;
use tower_service::Service;

#[tokio::test]
async fn writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.jsonl");
    let mut sink = JsonlSink::new(&path);
    assert_eq!(sink.path(), path.as_path());
    let at = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).single().unwrap();

    let retry = TelemetryRecord::retry_scheduled(
        at,
        Dependency::Metadata,
        1,
        Duration::from_secs(1),
        &UpstreamError::rate_limited(None),
    );
    sink.call(retry).await.unwrap();
    let key = LookupKey::parse("pikachu").unwrap();
    sink.call(TelemetryRecord::request(at, &key, 200, Duration::from_millis(42), "success"))
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&path).expect("file");
    let lines: Vec<serde_json::Value> =
        contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["kind"], "retry_scheduled");
    assert_eq!(lines[0]["service"], "poke_api");
    assert_eq!(lines[0]["status_code"], 0);
    assert_eq!(lines[0]["latency_ms"], -1.0);
    assert_eq!(lines[0]["retry_delay_ms"], 1000);
    assert_eq!(lines[1]["endpoint"], "/poke/search");
    assert_eq!(lines[1]["latency_ms"], 42.0);
}

#[tokio::test]
async fn unwritable_path_does_not_fail_the_caller() {
    let dir = tempfile::tempdir().unwrap();
    let sink = JsonlSink::new(dir.path().join("missing").join("telemetry.jsonl"));
    let telemetry = Telemetry::new(sink);
    let key = LookupKey::parse("ditto").unwrap();

    telemetry
        .emit(TelemetryRecord::request(telemetry.now(), &key, 500, Duration::ZERO, "failure"))
        .await;
}

#[tokio::test]
async fn non_blocking_wrapper_eventually_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.jsonl");
    let telemetry = Telemetry::new(NonBlockingSink::with_capacity(JsonlSink::new(&path), 16));
    let key = LookupKey::parse("eevee").unwrap();

    telemetry
        .emit(TelemetryRecord::request(telemetry.now(), &key, 207, Duration::ZERO, "partial"))
        .await;

    for _ in 0..100 {
        if std::fs::read_to_string(&path).map(|c| c.contains("eevee")).unwrap_or(false) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("record never reached {}", path.display());
}
