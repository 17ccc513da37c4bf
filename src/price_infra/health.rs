use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use crate::error::{Error, Result};
use crate::observability::metrics::{PROBE_LATENCY, SOURCES_OFFLINE};
use crate::price_infra::aggregator::PriceSource;
use crate::types::ids::SourceId;
use crate::types::timestamp::Timestamp;

/// Per-probe deadline used when none is configured.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Online,
    Offline,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source_id: SourceId,
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub active: bool,
    pub last_update: Option<Timestamp>,
}

/// Liveness check for one source. `Ok` means reachable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, source: &PriceSource, now: Timestamp) -> Result<()>;
}

/// Push-only sources: alive when active and fresh.
#[derive(Clone, Copy, Debug, Default)]
pub struct InferredProbe;

#[async_trait]
impl HealthProbe for InferredProbe {
    async fn probe(&self, source: &PriceSource, now: Timestamp) -> Result<()> {
        if !source.active {
            return Err(Error::ConnectorError(format!("{} is inactive", source.id)));
        }
        if !source.is_fresh(now) {
            return Err(Error::ConnectorError(format!("{} is stale", source.id)));
        }
        Ok(())
    }
}

/// Network sources: alive when a WebSocket handshake completes.
#[derive(Clone, Debug)]
pub struct WebSocketProbe {
    url: String,
}

impl WebSocketProbe {
    pub fn new(url: impl Into<String>) -> Self {
        WebSocketProbe { url: url.into() }
    }
}

#[async_trait]
impl HealthProbe for WebSocketProbe {
    async fn probe(&self, _source: &PriceSource, _now: Timestamp) -> Result<()> {
        let (mut stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::ConnectorError(format!("{}: {}", self.url, e)))?;
        // Best effort; the handshake already proved reachability
        let _ = stream.close(None).await;
        Ok(())
    }
}

/// Runs every probe concurrently, each bounded by `timeout`. A probe that
/// fails or runs out of time reports the source offline; it never fails the
/// whole check. Results keep the order of `targets`.
pub async fn run_probes(
    targets: Vec<(PriceSource, Arc<dyn HealthProbe>)>,
    now: Timestamp,
    timeout: Duration,
) -> Vec<SourceHealth> {
    let checks = targets.into_iter().map(|(source, probe)| async move {
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, probe.probe(&source, now)).await;
        let elapsed = started.elapsed();

        let status = match outcome {
            Ok(Ok(())) => HealthStatus::Online,
            Ok(Err(e)) => {
                tracing::debug!(source = %source.id, "Probe failed: {}", e);
                HealthStatus::Offline
            }
            Err(_) => {
                tracing::warn!(source = %source.id, timeout_ms = timeout.as_millis() as u64, "Probe timed out");
                HealthStatus::Offline
            }
        };
        PROBE_LATENCY.observe(elapsed.as_secs_f64());

        SourceHealth {
            source_id: source.id.clone(),
            status,
            latency_ms: elapsed.as_millis() as u64,
            active: source.active,
            last_update: source.last_update,
        }
    });

    let report = join_all(checks).await;
    let offline = report.iter().filter(|h| h.status == HealthStatus::Offline).count();
    SOURCES_OFFLINE.set(offline as i64);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::price::Price;

    fn source(id: &str, last_update: Option<u64>, active: bool) -> PriceSource {
        PriceSource {
            id: SourceId::new(id),
            weight_bps: 5_000,
            max_staleness_secs: 60,
            last_price: last_update.map(|_| Price::from_units(100)),
            last_update: last_update.map(Timestamp::from_secs),
            active,
            endpoint: None,
        }
    }

    #[tokio::test]
    async fn inferred_probe_uses_staleness_and_active_flag() {
        let now = Timestamp::from_secs(1_000);
        assert!(InferredProbe.probe(&source("a", Some(990), true), now).await.is_ok());
        assert!(InferredProbe.probe(&source("b", Some(900), true), now).await.is_err());
        assert!(InferredProbe.probe(&source("c", Some(990), false), now).await.is_err());
        assert!(InferredProbe.probe(&source("d", None, true), now).await.is_err());
    }

    #[tokio::test]
    async fn failing_and_slow_probes_report_offline() {
        let mut failing = MockHealthProbe::new();
        failing
            .expect_probe()
            .returning(|_, _| Err(Error::ConnectorError("refused".into())));

        struct Slow;
        #[async_trait]
        impl HealthProbe for Slow {
            async fn probe(&self, _source: &PriceSource, _now: Timestamp) -> Result<()> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }

        let now = Timestamp::from_secs(1_000);
        let targets: Vec<(PriceSource, Arc<dyn HealthProbe>)> = vec![
            (source("fresh", Some(995), true), Arc::new(InferredProbe)),
            (source("refused", Some(995), true), Arc::new(failing)),
            (source("slow", Some(995), true), Arc::new(Slow)),
        ];

        let report = run_probes(targets, now, Duration::from_millis(50)).await;

        let statuses: Vec<_> = report.iter().map(|h| (h.source_id.as_str(), h.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("fresh", HealthStatus::Online),
                ("refused", HealthStatus::Offline),
                ("slow", HealthStatus::Offline),
            ]
        );
        assert!(report[2].latency_ms >= 50);
    }

    #[tokio::test]
    async fn websocket_probe_reports_unreachable_endpoint() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = WebSocketProbe::new(format!("ws://{}", addr));
        let result = probe.probe(&source("ws", None, true), Timestamp::from_secs(0)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn websocket_probe_completes_handshake() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                    let _ = ws.close(None).await;
                }
            }
        });

        let probe = WebSocketProbe::new(format!("ws://{}", addr));
        let result = probe.probe(&source("ws", None, true), Timestamp::from_secs(0)).await;
        assert!(result.is_ok());
    }
}
