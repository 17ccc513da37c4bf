use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::events::price::{CircuitBreakerReset, CircuitBreakerTriggered, ConfigUpdated, PriceAggregated};
use crate::types::ids::EventId;
use crate::types::timestamp::Timestamp;

/// Envelope handed to every [`EventSink`](crate::interfaces::event_sink::EventSink).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OracleEvent {
    pub event_id: EventId,
    pub event_type: EventType,
    pub version: u32,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
    pub checksum: String,
}

impl OracleEvent {
    pub fn new(timestamp: Timestamp, payload: EventPayload) -> Self {
        let mut event = OracleEvent {
            event_id: EventId::new(),
            event_type: payload.event_type(),
            version: 1,
            timestamp,
            payload,
            checksum: String::new(),
        };
        event.checksum = event.calculate_checksum();
        event
    }

    pub fn calculate_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.event_id.0.as_bytes());
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.timestamp.as_secs().to_le_bytes());
        hasher.update(format!("{:?}", self.event_type).as_bytes());
        // Payload structs are plain data; serialization cannot fail.
        if let Ok(payload) = serde_json::to_vec(&self.payload) {
            hasher.update(payload);
        }
        hex::encode(hasher.finalize())
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.calculate_checksum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    PriceAggregated(PriceAggregated),
    CircuitBreakerTriggered(CircuitBreakerTriggered),
    CircuitBreakerReset(CircuitBreakerReset),
    ConfigUpdated(ConfigUpdated),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::PriceAggregated(_) => EventType::PriceAggregated,
            EventPayload::CircuitBreakerTriggered(_) => EventType::CircuitBreakerTriggered,
            EventPayload::CircuitBreakerReset(_) => EventType::CircuitBreakerReset,
            EventPayload::ConfigUpdated(_) => EventType::ConfigUpdated,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    PriceAggregated,
    CircuitBreakerTriggered,
    CircuitBreakerReset,
    ConfigUpdated,
}
