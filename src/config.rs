//! Gateway configuration.
//!
//! Loaded from a JSON file. Every field has a default, so `{}` is a complete configuration;
//! unknown fields are rejected so typos surface at startup instead of being ignored.

use crate::connectors::assets::{DEFAULT_EXTENSION, DEFAULT_PUBLIC_PREFIX};
use crate::connectors::metadata::DEFAULT_BASE_URL;
use crate::connectors::stats::DEFAULT_NAME_COLUMN;
use crate::error::GatewayError;
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::telemetry::Telemetry;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub metadata: MetadataConfig,
    pub retry: RetryConfig,
    pub stats: StatsConfig,
    pub assets: AssetsConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    pub base_url: String,
    /// Bound on one HTTP attempt, connect to last body byte.
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatsConfig {
    pub csv_path: PathBuf,
    pub name_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    pub root: PathBuf,
    pub public_prefix: String,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Append records here as JSON lines. Records only go to the log when unset.
    pub jsonl_path: Option<PathBuf>,
    /// Queue length in front of the file sink.
    pub buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            metadata: MetadataConfig::default(),
            retry: RetryConfig::default(),
            stats: StatsConfig::default(),
            assets: AssetsConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_BASE_URL.to_string(), request_timeout_ms: 5_000 }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, base_delay_ms: 1_000, max_delay_ms: 10_000 }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("data/pokemon.csv"),
            name_column: DEFAULT_NAME_COLUMN.to_string(),
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/images"),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { jsonl_path: None, buffer: 1024 }
    }
}

impl GatewayConfig {
    /// Read, parse and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| GatewayError::ConfigIo { path: path.to_path_buf(), source })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, GatewayError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        let invalid = |message: &str| Err(GatewayError::Config(message.to_string()));

        match reqwest::Url::parse(&self.metadata.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return invalid("metadata.base_url must be an http(s) URL"),
        }
        if self.metadata.request_timeout_ms == 0 {
            return invalid("metadata.request_timeout_ms must be > 0");
        }
        if self.stats.name_column.trim().is_empty() {
            return invalid("stats.name_column must not be empty");
        }
        if self.assets.extension.trim_start_matches('.').is_empty() {
            return invalid("assets.extension must not be empty");
        }
        if self.telemetry.buffer == 0 {
            return invalid("telemetry.buffer must be > 0");
        }
        self.retry_policy(Telemetry::disabled())?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata.request_timeout_ms)
    }

    /// Retry policy for the metadata connector.
    pub fn retry_policy(&self, telemetry: Telemetry) -> Result<RetryPolicy, GatewayError> {
        let policy = RetryPolicy::builder()
            .max_attempts(self.retry.max_attempts)
            .base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_telemetry(telemetry)
            .build()?;
        Ok(policy)
    }
}
