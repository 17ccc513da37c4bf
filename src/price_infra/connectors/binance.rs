use async_trait::async_trait;
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tokio_tungstenite::MaybeTlsStream;
use tokio::net::TcpStream;
use futures_util::StreamExt;
use serde::Deserialize;
use crate::price_infra::connectors::PriceConnector;
use crate::price_infra::RawPriceUpdate;
use crate::error::{Error, Result};
use crate::types::ids::SourceId;
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

pub struct BinanceConnector {
    source_id: SourceId,
    symbol: String,
    ws_url: String,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl BinanceConnector {
    pub fn new(source_id: SourceId, symbol: &str) -> Self {
        let ws_url = format!("wss://stream.binance.com:9443/ws/{}@trade", symbol.to_lowercase());
        Self::with_url(source_id, symbol, ws_url)
    }

    pub fn with_url(source_id: SourceId, symbol: &str, ws_url: impl Into<String>) -> Self {
        BinanceConnector {
            source_id,
            symbol: symbol.to_lowercase(),
            ws_url: ws_url.into(),
            stream: None,
        }
    }
}

#[async_trait]
impl PriceConnector for BinanceConnector {
    async fn connect(&mut self) -> Result<()> {
        let (ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| Error::ConnectorError(format!("WebSocket connection failed: {}", e)))?;
        self.stream = Some(ws_stream);
        tracing::info!(source = %self.source_id, "Connected to Binance: {}", self.symbol);
        Ok(())
    }

    async fn next_price(&mut self) -> Result<RawPriceUpdate> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        loop {
            let Some(msg) = stream.next().await else {
                self.stream = None;
                return Err(Error::ConnectionClosed);
            };
            let msg = msg.map_err(|e| Error::ConnectorError(e.to_string()))?;

            if let Message::Text(text) = msg {
                return parse_trade(&self.source_id, &text);
            }
        }
    }

    fn is_healthy(&self) -> bool {
        self.stream.is_some()
    }

    fn source_id(&self) -> &SourceId {
        &self.source_id
    }
}

fn parse_trade(source_id: &SourceId, text: &str) -> Result<RawPriceUpdate> {
    let data: BinanceTradeData = serde_json::from_str(text)
        .map_err(|e| Error::DeserializationError(e.to_string()))?;

    Ok(RawPriceUpdate {
        source_id: source_id.clone(),
        price: data.price.parse::<Price>()?,
        timestamp: Timestamp::from_secs(data.trade_time_ms / 1_000),
    })
}

#[derive(Deserialize)]
struct BinanceTradeData {
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "T")]
    trade_time_ms: u64,
}
