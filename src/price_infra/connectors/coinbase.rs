use async_trait::async_trait;
use chrono::DateTime;
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tokio_tungstenite::MaybeTlsStream;
use tokio::net::TcpStream;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use crate::price_infra::connectors::PriceConnector;
use crate::price_infra::RawPriceUpdate;
use crate::error::{Error, Result};
use crate::types::ids::SourceId;
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

pub struct CoinbaseConnector {
    source_id: SourceId,
    product_id: String,
    ws_url: String,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl CoinbaseConnector {
    pub fn new(source_id: SourceId, product_id: &str) -> Self {
        Self::with_url(source_id, product_id, "wss://ws-feed.exchange.coinbase.com")
    }

    pub fn with_url(source_id: SourceId, product_id: &str, ws_url: impl Into<String>) -> Self {
        CoinbaseConnector {
            source_id,
            product_id: product_id.to_uppercase(),
            ws_url: ws_url.into(),
            stream: None,
        }
    }
}

#[async_trait]
impl PriceConnector for CoinbaseConnector {
    async fn connect(&mut self) -> Result<()> {
        let (mut ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| Error::ConnectorError(format!("WebSocket connection failed: {}", e)))?;

        let subscribe = serde_json::json!({
            "type": "subscribe",
            "product_ids": [self.product_id],
            "channels": ["ticker"],
        });
        ws_stream
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| Error::ConnectorError(format!("Subscribe failed: {}", e)))?;

        self.stream = Some(ws_stream);
        tracing::info!(source = %self.source_id, "Connected to Coinbase: {}", self.product_id);
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
                if let Some(update) = parse_ticker(&self.source_id, &text)? {
                    return Ok(update);
                }
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

/// `None` for non-ticker messages (subscriptions, heartbeats).
fn parse_ticker(source_id: &SourceId, text: &str) -> Result<Option<RawPriceUpdate>> {
    let data: CoinbaseMessage = serde_json::from_str(text)
        .map_err(|e| Error::DeserializationError(e.to_string()))?;

    if data.type_field != "ticker" {
        return Ok(None);
    }

    let price = data
        .price
        .ok_or_else(|| Error::DeserializationError("ticker without price".to_string()))?
        .parse::<Price>()?;
    let time = data
        .time
        .ok_or_else(|| Error::DeserializationError("ticker without time".to_string()))?;
    let time = DateTime::parse_from_rfc3339(&time)
        .map_err(|e| Error::DeserializationError(e.to_string()))?;

    Ok(Some(RawPriceUpdate {
        source_id: source_id.clone(),
        price,
        timestamp: Timestamp::from_secs(time.timestamp().max(0) as u64),
    }))
}

#[derive(Deserialize)]
struct CoinbaseMessage {
    #[serde(rename = "type")]
    type_field: String,
    price: Option<String>,
    time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ticker() {
        let text = r#"{"type":"ticker","sequence":1,"product_id":"ETH-USD","price":"3351.5","volume_24h":"1000","time":"2023-11-14T22:13:20.000000Z"}"#;
        let update = parse_ticker(&SourceId::new("coinbase"), text).unwrap().unwrap();
        assert_eq!(update.price, "3351.5".parse::<Price>().unwrap());
        assert_eq!(update.timestamp, Timestamp::from_secs(1_700_000_000));
    }

    #[test]
    fn skips_non_ticker_messages() {
        let text = r#"{"type":"subscriptions","channels":[]}"#;
        assert_eq!(parse_ticker(&SourceId::new("coinbase"), text).unwrap(), None);
    }

    #[test]
    fn ticker_without_price_is_an_error() {
        let text = r#"{"type":"ticker","time":"2023-11-14T22:13:20Z"}"#;
        assert!(parse_ticker(&SourceId::new("coinbase"), text).is_err());
    }
}
