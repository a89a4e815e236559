#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pokegate::telemetry::MemorySink;
use pokegate::{
    AssetConnector, FixedClock, Gateway, LookupKey, MetadataConnector, MetadataSource,
    RetryPolicy, StatsConnector, StatsTable, Telemetry, TrackingSleeper, UpstreamError,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const STATS_CSV: &str = "\
#,Name,Type 1,Total,HP,Attack
25,Pikachu,Electric,320,35,55
133,Eevee,Normal,325,55,55
122,Mr. Mime,Psychic,460,40,45
0,invalidpokemon123,Unknown,0,0,0
";

type Respond = dyn Fn(&str, u32) -> Result<Value, UpstreamError> + Send + Sync;

/// Metadata source answering from a closure of `(key, call number for that key)`.
#[derive(Clone)]
pub struct StubSource {
    respond: Arc<Respond>,
    calls: Arc<Mutex<HashMap<String, u32>>>,
}

impl StubSource {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str, u32) -> Result<Value, UpstreamError> + Send + Sync + 'static,
    {
        Self { respond: Arc::new(respond), calls: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Every key resolves to a well-formed provider body.
    pub fn healthy() -> Self {
        Self::new(|key, _| Ok(provider_body(key)))
    }

    pub fn calls(&self, key: &str) -> u32 {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

impl std::fmt::Debug for StubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubSource").field("calls", &self.calls).finish()
    }
}

#[async_trait]
impl MetadataSource for StubSource {
    fn name(&self) -> &str {
        "stub"
    }

    async fn lookup(&self, key: &LookupKey) -> Result<Value, UpstreamError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(key.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        tokio::task::yield_now().await;
        (self.respond)(key.as_str(), call)
    }
}

pub fn provider_body(key: &str) -> Value {
    json!({
        "id": key.len(),
        "name": key,
        "height": 4,
        "weight": 60,
        "stats": [{"base_stat": 35, "stat": {"name": "hp"}}],
        "sprites": {"front_default": format!("https://img.example/{key}.png")}
    })
}

pub fn requested_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 14, 9, 26, 53).single().unwrap()
}

pub struct Fixture {
    pub gateway: Gateway,
    pub sink: MemorySink,
    pub source: StubSource,
    pub sleeper: TrackingSleeper,
    pub assets: TempDir,
}

/// Gateway over a stub provider, an in-memory stats table and a temp asset store holding two
/// images for `pikachu`.
pub fn fixture(source: StubSource) -> Fixture {
    let assets = tempfile::tempdir().unwrap();
    let pikachu = assets.path().join("pikachu");
    std::fs::create_dir(&pikachu).unwrap();
    std::fs::write(pikachu.join("1.jpg"), b"").unwrap();
    std::fs::write(pikachu.join("2.jpg"), b"").unwrap();

    let sink = MemorySink::new();
    let sleeper = TrackingSleeper::new();
    let telemetry = Telemetry::new(sink.clone()).with_clock(FixedClock(requested_at()));
    let retry = RetryPolicy::builder()
        .with_sleeper(sleeper.clone())
        .with_telemetry(telemetry.clone())
        .build()
        .unwrap();
    let table = StatsTable::from_csv_reader(STATS_CSV.as_bytes(), "Name").unwrap();

    let gateway = Gateway::builder()
        .metadata(MetadataConnector::new(source.clone(), retry, telemetry.clone()))
        .stats(StatsConnector::new(Arc::new(table), telemetry.clone()))
        .assets(AssetConnector::new(assets.path(), telemetry.clone()))
        .telemetry(telemetry)
        .build()
        .unwrap();

    Fixture { gateway, sink, source, sleeper, assets }
}
