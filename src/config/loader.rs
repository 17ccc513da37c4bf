use std::collections::HashSet;
use crate::config::*;
use crate::error::{Error, Result};
use crate::price_infra::circuit_breaker::CircuitBreakerConfig;
use crate::price_infra::PriceSourceConfig;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub sources: Vec<PriceSourceConfig>,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub keeper: KeeperSettings,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// `config/default` then `config/{env}` (optional) then
    /// `ORACLE_GUARD__SECTION__KEY` environment variables.
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("ORACLE_GUARD").separator("__"))
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let app: AppConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        self.breaker.validate()?;

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(&source.source_id) {
                return Err(Error::DuplicateSource(source.source_id.clone()));
            }
            if source.weight_bps == 0 || source.weight_bps > crate::price_infra::aggregator::MAX_WEIGHT_BPS {
                return Err(Error::InvalidWeight(source.weight_bps));
            }
            if source.max_staleness_secs == 0 {
                return Err(Error::InvalidStaleness(source.source_id.clone()));
            }
        }

        if self.keeper.interval_secs == 0 || self.health.interval_secs == 0 {
            return Err(Error::ConfigError("intervals must be at least one second".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_infra::FeedKind;

    const SAMPLE: &str = r#"
        [breaker]
        price_deviation_threshold_bps = 500
        time_window_secs = 300
        cooldown_period_secs = 1800
        is_active = true

        [[sources]]
        source_id = "chainlink"
        weight_bps = 6000
        max_staleness_secs = 3600

        [[sources]]
        source_id = "binance"
        weight_bps = 4000
        max_staleness_secs = 60
        endpoint = "wss://stream.binance.com:9443/ws"
        feed = { type = "binance", symbol = "ETHUSDT" }

        [health]
        probe_timeout_ms = 2500
    "#;

    #[test]
    fn parses_sections_and_defaults() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.breaker.price_deviation_threshold_bps, 500);
        assert_eq!(config.breaker.cooldown_period_secs, 1800);
        assert_eq!(config.sources.len(), 2);
        assert!(config.sources[0].enabled);
        assert_eq!(config.sources[0].endpoint, None);
        assert_eq!(
            config.sources[1].feed,
            Some(FeedKind::Binance { symbol: "ETHUSDT".to_string() })
        );
        assert_eq!(config.health.probe_timeout_ms, 2500);
        assert_eq!(config.health.interval_secs, 30);
        assert_eq!(config.keeper.interval_secs, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.breaker, CircuitBreakerConfig::default());
        assert!(config.sources.is_empty());
    }

    #[test]
    fn rejects_out_of_bounds_breaker() {
        let toml = r#"
            [breaker]
            price_deviation_threshold_bps = 2500
            time_window_secs = 300
            cooldown_period_secs = 1800
            is_active = true
        "#;
        assert!(matches!(AppConfig::from_toml_str(toml), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_duplicate_sources() {
        let toml = r#"
            [[sources]]
            source_id = "a"
            weight_bps = 100
            max_staleness_secs = 60

            [[sources]]
            source_id = "a"
            weight_bps = 200
            max_staleness_secs = 60
        "#;
        assert!(matches!(AppConfig::from_toml_str(toml), Err(Error::DuplicateSource(_))));
    }

    #[test]
    fn rejects_zero_staleness_before_startup() {
        let toml = r#"
            [[sources]]
            source_id = "frozen"
            weight_bps = 10000
            max_staleness_secs = 0
        "#;
        assert!(matches!(AppConfig::from_toml_str(toml), Err(Error::InvalidStaleness(_))));
    }

    #[test]
    fn default_probe_timeout_is_five_seconds() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.health.probe_timeout(), std::time::Duration::from_secs(5));
    }
}
