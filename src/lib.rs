pub mod types;
pub mod events;
pub mod interfaces;
pub mod price_infra;
pub mod core;
pub mod error;
pub mod config;
pub mod observability;
pub mod utils;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::price_infra::aggregator::{ConsensusReading, OracleAggregator, PriceSource};
pub use crate::price_infra::circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig, PriceCheck};
pub use crate::types::price::Price;
pub use crate::types::timestamp::{Clock, ManualClock, SystemClock, Timestamp};
