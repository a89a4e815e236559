//! Local asset store connector.
//!
//! Assets for a key live in `<root>/<key>/` and are named `<id>.<ext>`. They are published under
//! `<public_prefix>/<key>/<file>`, ordered by numeric id.

use super::Connector;
use crate::error::UpstreamError;
use crate::outcome::{Dependency, LookupKey, UpstreamOutcome};
use crate::telemetry::{Telemetry, TelemetryRecord};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::io;
use std::path::{Path, PathBuf};
use tokio::time::Instant;

pub const DEFAULT_EXTENSION: &str = "jpg";
pub const DEFAULT_PUBLIC_PREFIX: &str = "/data/images";

#[derive(Debug, Clone)]
pub struct AssetConnector {
    root: PathBuf,
    public_prefix: String,
    extension: String,
    telemetry: Telemetry,
}

impl AssetConnector {
    pub fn new(root: impl Into<PathBuf>, telemetry: Telemetry) -> Self {
        Self {
            root: root.into(),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            telemetry,
        }
    }

    pub fn with_public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sort key of a file following the naming scheme: its digits without leading zeros,
    /// ordered by length first so ids of any size compare numerically.
    fn asset_id<'a>(&self, file_name: &'a str) -> Option<(usize, &'a str)> {
        let (stem, extension) = file_name.rsplit_once('.')?;
        if extension != self.extension || stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits = stem.trim_start_matches('0');
        Some((digits.len(), digits))
    }

    /// File names under `dir`, ordered by id. A missing directory holds no assets.
    async fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            match self.asset_id(file_name) {
                Some((len, digits)) => found.push((len, digits.to_string(), file_name.to_string())),
                None => tracing::debug!(file = file_name, "skipping file outside naming scheme"),
            }
        }
        found.sort();
        Ok(found.into_iter().map(|(_, _, name)| name).collect())
    }

    fn payload(&self, key: &LookupKey, dir: &Path, files: Vec<String>) -> Value {
        let images: Vec<String> =
            files.iter().map(|file| format!("{}/{}/{}", self.public_prefix, key, file)).collect();
        json!({
            "images": images,
            "image_count": images.len(),
            "images_available": !images.is_empty(),
            "folder_path": dir.display().to_string(),
        })
    }
}

#[async_trait]
impl Connector for AssetConnector {
    fn dependency(&self) -> Dependency {
        Dependency::Assets
    }

    async fn fetch(&self, key: &LookupKey) -> UpstreamOutcome {
        let started = Instant::now();
        let dir = self.root.join(key.as_str());
        let result = match self.list(&dir).await {
            Ok(files) => Ok(self.payload(key, &dir, files)),
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "asset scan failed");
                Err(UpstreamError::TransientNetwork {
                    message: format!("asset store unavailable: {err}"),
                    status: Some(500),
                })
            }
        };
        let latency = started.elapsed();

        let (status, message) = match &result {
            Ok(payload) => (200, format!("found {} images", payload["image_count"])),
            Err(err) => (err.status().unwrap_or(0), err.to_string()),
        };
        self.telemetry
            .emit(TelemetryRecord::attempt(
                self.telemetry.now(),
                Dependency::Assets,
                1,
                status,
                latency,
                message,
            ))
            .await;

        match result {
            Ok(payload) => UpstreamOutcome::success(Dependency::Assets, payload, 1, latency),
            Err(err) => UpstreamOutcome::failure(Dependency::Assets, err, 1, latency),
        }
    }
}
