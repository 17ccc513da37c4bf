use thiserror::Error;
use crate::interfaces::authorizer::Role;
use crate::types::ids::{OperatorId, SourceId};
use crate::types::timestamp::Timestamp;

#[derive(Error, Debug)]
pub enum Error {
    // Oracle Registry Errors
    #[error("Duplicate price source: {0}")]
    DuplicateSource(SourceId),

    #[error("Unknown price source: {0}")]
    UnknownSource(SourceId),

    #[error("Invalid weight {0} bps: must be within 1..=10000")]
    InvalidWeight(u32),

    #[error("Invalid staleness bound for {0}: must be at least one second")]
    InvalidStaleness(SourceId),

    // Submission Errors
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Stale price from {source_id}: submitted at {submitted}, last accepted at {last}")]
    StalePrice {
        source_id: SourceId,
        submitted: Timestamp,
        last: Timestamp,
    },

    #[error("Price from {source_id} is timestamped {submitted}, ahead of clock {now}")]
    FutureTimestamp {
        source_id: SourceId,
        submitted: Timestamp,
        now: Timestamp,
    },

    // Aggregation Errors
    #[error("No fresh price sources ({active} active)")]
    NoFreshSources { active: usize },

    #[error("No consensus price has been computed yet")]
    NoPriceAvailable,

    // Circuit Breaker Errors
    #[error("Invalid circuit breaker config: {0}")]
    InvalidConfig(String),

    // Access Control Errors
    #[error("Operator {operator} lacks role {role:?}")]
    Unauthorized {
        operator: OperatorId,
        role: Role,
    },

    // Price Feed Errors
    #[error("Price connector not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connector error: {0}")]
    ConnectorError(String),

    #[error("Event deserialization failed: {0}")]
    DeserializationError(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Max reconnect attempts exceeded")]
    MaxReconnectAttemptsExceeded,

    // System Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Task error: {0}")]
    TaskError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    StaleData,
    NoFreshSources,
    NoPriceAvailable,
    Infrastructure,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateSource(_)
            | Error::UnknownSource(_)
            | Error::InvalidWeight(_)
            | Error::InvalidStaleness(_)
            | Error::InvalidPrice(_)
            | Error::FutureTimestamp { .. }
            | Error::InvalidConfig(_) => ErrorKind::Validation,
            Error::Unauthorized { .. } => ErrorKind::Unauthorized,
            Error::StalePrice { .. } => ErrorKind::StaleData,
            Error::NoFreshSources { .. } => ErrorKind::NoFreshSources,
            Error::NoPriceAvailable => ErrorKind::NoPriceAvailable,
            _ => ErrorKind::Infrastructure,
        }
    }

    /// Everything the core rejects can be retried with corrected input or
    /// after more data arrives.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Infrastructure
    }
}

impl From<::config::ConfigError> for Error {
    fn from(e: ::config::ConfigError) -> Self {
        Error::ConfigError(e.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(e: prometheus::Error) -> Self {
        Error::MetricsError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(Error::InvalidWeight(0).kind(), ErrorKind::Validation);
        assert_eq!(Error::DuplicateSource("a".into()).kind(), ErrorKind::Validation);
        assert_eq!(
            Error::Unauthorized { operator: OperatorId::new(), role: Role::Emergency }.kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(
            Error::StalePrice {
                source_id: "a".into(),
                submitted: Timestamp::from_secs(1),
                last: Timestamp::from_secs(2),
            }
            .kind(),
            ErrorKind::StaleData
        );
        assert_eq!(Error::NoFreshSources { active: 2 }.kind(), ErrorKind::NoFreshSources);
        assert_eq!(Error::NoPriceAvailable.kind(), ErrorKind::NoPriceAvailable);
        assert_eq!(Error::ConnectionClosed.kind(), ErrorKind::Infrastructure);
        assert!(!Error::ConnectionClosed.is_recoverable());
        assert!(Error::NoPriceAvailable.is_recoverable());
    }
}
