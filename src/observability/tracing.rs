use tracing::Span;
use tracing_subscriber::EnvFilter;
use crate::config::LoggingSettings;
use crate::error::{Error, Result};

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| Error::ConfigError(format!("invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::ConfigError(format!("tracing already initialised: {}", e)))
}

pub fn trace_consensus_round(round: u64) -> Span {
    tracing::info_span!(
        "consensus_round",
        round,
    )
}

pub fn trace_health_check(sources: usize) -> Span {
    tracing::info_span!(
        "health_check",
        sources,
    )
}
