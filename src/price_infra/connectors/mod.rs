pub mod binance;
pub mod coinbase;

use async_trait::async_trait;
use crate::price_infra::{FeedKind, RawPriceUpdate};
use crate::error::Result;
use crate::types::ids::SourceId;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceConnector: Send + Sync {
    async fn connect(&mut self) -> Result<()>;
    async fn next_price(&mut self) -> Result<RawPriceUpdate>;
    fn is_healthy(&self) -> bool;
    fn source_id(&self) -> &SourceId;
}

/// Connector for a configured feed, reporting as `source_id`.
pub fn connector_for(source_id: SourceId, feed: &FeedKind) -> Box<dyn PriceConnector> {
    match feed {
        FeedKind::Binance { symbol } => Box::new(binance::BinanceConnector::new(source_id, symbol)),
        FeedKind::Coinbase { product_id } => Box::new(coinbase::CoinbaseConnector::new(source_id, product_id)),
    }
}
