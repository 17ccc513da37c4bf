use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::Instrument;
use crate::error::Result;
use crate::observability::tracing::trace_health_check;
use crate::price_infra::aggregator::OracleAggregator;
use crate::price_infra::health::{HealthStatus, SourceHealth};

/// Periodically probes every source and logs the ones that are down.
/// Runs beside the keeper; probes never touch the price write path.
pub struct HealthMonitor {
    aggregator: Arc<OracleAggregator>,
    check_interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(aggregator: Arc<OracleAggregator>, check_interval: Duration, probe_timeout: Duration) -> Self {
        HealthMonitor {
            aggregator,
            check_interval,
            probe_timeout,
        }
    }

    pub async fn check_once(&self) -> Vec<SourceHealth> {
        let span = trace_health_check(self.aggregator.source_count());
        let report = self.aggregator
            .check_oracle_health(self.probe_timeout)
            .instrument(span)
            .await;

        for health in report.iter().filter(|h| h.active && h.status == HealthStatus::Offline) {
            tracing::warn!(
                source = %health.source_id,
                latency_ms = health.latency_ms,
                last_update = ?health.last_update.map(|t| t.as_secs()),
                "Price source offline"
            );
        }
        report
    }

    pub async fn run(self) -> Result<()> {
        let mut ticker = interval(self.check_interval);

        loop {
            ticker.tick().await;
            let report = self.check_once().await;
            let online = report.iter().filter(|h| h.status == HealthStatus::Online).count();
            tracing::info!(online, total = report.len(), "Health check complete");
        }
    }
}
