pub mod aggregator;
pub mod circuit_breaker;
pub mod connectors;
pub mod feed;
pub mod health;
pub mod history;

use serde::{Deserialize, Serialize};
use crate::types::ids::SourceId;
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

/// A price source as declared in configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PriceSourceConfig {
    pub source_id: SourceId,
    pub weight_bps: u32,
    pub max_staleness_secs: u64,
    /// Probed by the health check; push-only sources leave this unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Streaming feed that submits prices for this source.
    #[serde(default)]
    pub feed: Option<FeedKind>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedKind {
    Binance { symbol: String },
    Coinbase { product_id: String },
}

/// One observation as received from a feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawPriceUpdate {
    pub source_id: SourceId,
    pub price: Price,
    pub timestamp: Timestamp,
}
