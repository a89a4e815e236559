//! Upstream connectors.
//!
//! Each connector wraps exactly one dependency and turns a lookup into an
//! [`UpstreamOutcome`]. Failures are captured in the outcome; `fetch` itself cannot fail, which
//! is what lets the orchestrator join all three calls unconditionally.

pub mod assets;
pub mod metadata;
pub mod stats;

pub use assets::AssetConnector;
pub use metadata::{HttpMetadataSource, MetadataConnector, MetadataSource};
pub use stats::{StatsConnector, StatsTable};

use crate::outcome::{Dependency, LookupKey, UpstreamOutcome};
use async_trait::async_trait;

/// One upstream dependency behind a uniform call shape.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// The dependency this connector serves. Fixed for the connector's lifetime.
    fn dependency(&self) -> Dependency;

    /// Look `key` up. Always returns an outcome filed under [`Connector::dependency`].
    async fn fetch(&self, key: &LookupKey) -> UpstreamOutcome;
}
