//! Local structured-data connector backed by a CSV table loaded once at startup.

use super::Connector;
use crate::error::{GatewayError, UpstreamError};
use crate::outcome::{normalise_key, Dependency, LookupKey, UpstreamOutcome};
use crate::telemetry::{Telemetry, TelemetryRecord};
use async_trait::async_trait;
use serde_json::{json, Map, Number, Value};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::time::Instant;

/// Column holding the lookup name when the configuration names none.
pub const DEFAULT_NAME_COLUMN: &str = "Name";

/// Read-only table of rows keyed by normalised name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsTable {
    rows: HashMap<String, Map<String, Value>>,
}

impl StatsTable {
    /// Build from `(name, row)` pairs. The first row for a name wins.
    pub fn from_records<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = (S, Map<String, Value>)>,
        S: AsRef<str>,
    {
        let mut rows = HashMap::new();
        for (name, row) in records {
            rows.entry(normalise_key(name.as_ref())).or_insert(row);
        }
        Self { rows }
    }

    pub fn from_csv_reader<R: io::Read>(reader: R, name_column: &str) -> Result<Self, GatewayError> {
        let reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        Self::load(reader, name_column, Path::new("<reader>"))
    }

    pub fn from_csv_path(path: impl AsRef<Path>, name_column: &str) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| GatewayError::StatsLoad { path: path.to_path_buf(), source })?;
        let table = Self::load(reader, name_column, path)?;
        tracing::info!(path = %path.display(), rows = table.len(), "loaded stats table");
        Ok(table)
    }

    fn load<R: io::Read>(
        mut reader: csv::Reader<R>,
        name_column: &str,
        origin: &Path,
    ) -> Result<Self, GatewayError> {
        let load_error = |source| GatewayError::StatsLoad { path: origin.to_path_buf(), source };
        let headers = reader.headers().map_err(load_error)?.clone();
        let name_index = headers
            .iter()
            .position(|header| header == name_column)
            .ok_or_else(|| GatewayError::MissingColumn(name_column.to_string()))?;

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(load_error)?;
            let Some(name) = record.get(name_index).filter(|name| !name.is_empty()) else {
                continue;
            };
            let row: Map<String, Value> = headers
                .iter()
                .zip(record.iter())
                .map(|(header, cell)| (header.to_string(), cell_value(cell)))
                .collect();
            records.push((name.to_string(), row));
        }
        Ok(Self::from_records(records))
    }

    pub fn get(&self, key: &LookupKey) -> Option<&Map<String, Value>> {
        self.rows.get(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Integers and finite floats become JSON numbers, empty cells null, the rest strings.
fn cell_value(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = cell.parse::<i64>() {
        return Value::from(int);
    }
    cell.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(cell.to_string()))
}

/// Connector over a shared [`StatsTable`]. One attempt per lookup, never retried.
#[derive(Debug, Clone)]
pub struct StatsConnector {
    table: Arc<StatsTable>,
    telemetry: Telemetry,
}

impl StatsConnector {
    pub fn new(table: Arc<StatsTable>, telemetry: Telemetry) -> Self {
        Self { table, telemetry }
    }
}

#[async_trait]
impl Connector for StatsConnector {
    fn dependency(&self) -> Dependency {
        Dependency::Stats
    }

    async fn fetch(&self, key: &LookupKey) -> UpstreamOutcome {
        let started = Instant::now();
        let result = match self.table.get(key) {
            Some(row) => Ok(json!({ "pokemon_name": key.as_str(), "stats": row })),
            None => Err(UpstreamError::TerminalClient {
                message: format!("{key} not found in local dataset"),
                status: Some(404),
            }),
        };
        let latency = started.elapsed();

        let (status, message) = match &result {
            Ok(_) => (200, format!("found stats for {key}")),
            Err(err) => (err.status().unwrap_or(0), err.to_string()),
        };
        tracing::debug!(dependency = "stats_data", %key, status, "stats lookup finished");
        self.telemetry
            .emit(TelemetryRecord::attempt(
                self.telemetry.now(),
                Dependency::Stats,
                1,
                status,
                latency,
                message,
            ))
            .await;

        match result {
            Ok(payload) => UpstreamOutcome::success(Dependency::Stats, payload, 1, latency),
            Err(err) => UpstreamOutcome::failure(Dependency::Stats, err, 1, latency),
        }
    }
}
