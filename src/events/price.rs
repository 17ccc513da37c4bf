use serde::{Deserialize, Serialize};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAggregated {
    pub price: Price,
    pub timestamp: Timestamp,
    pub confidence: u8,
    pub oracle_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerTriggered {
    pub old_price: Price,
    pub new_price: Price,
    pub deviation_bps: u32,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerReset {
    pub timestamp: Timestamp,
    pub reason: ResetReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetReason {
    CooldownElapsed,
    Emergency,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdated {
    pub threshold_bps: u32,
    pub window_secs: u64,
    pub cooldown_secs: u64,
}
