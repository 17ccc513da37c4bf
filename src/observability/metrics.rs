use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use crate::error::Result;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Circuit breaker metrics
    pub static ref PRICE_CHECKS: IntCounter = IntCounter::new(
        "breaker_price_checks_total",
        "Total number of candidate prices checked"
    ).expect("metric can be created");

    pub static ref PRICE_CHECKS_REJECTED: IntCounter = IntCounter::new(
        "breaker_price_checks_rejected_total",
        "Candidate prices rejected by the circuit breaker"
    ).expect("metric can be created");

    pub static ref BREAKER_TRIGGERS: IntCounter = IntCounter::new(
        "breaker_triggers_total",
        "Times the circuit breaker tripped"
    ).expect("metric can be created");

    pub static ref BREAKER_RESETS: IntCounter = IntCounter::new(
        "breaker_resets_total",
        "Times the circuit breaker re-armed (cooldown or emergency)"
    ).expect("metric can be created");

    pub static ref BREAKER_TRIGGERED: IntGauge = IntGauge::new(
        "breaker_triggered",
        "1 while the circuit breaker is tripped"
    ).expect("metric can be created");

    // Aggregator metrics
    pub static ref CONSENSUS_ROUNDS: IntCounter = IntCounter::new(
        "consensus_rounds_total",
        "Successful consensus computations"
    ).expect("metric can be created");

    pub static ref CONSENSUS_FAILURES: IntCounter = IntCounter::new(
        "consensus_failures_total",
        "Consensus computations with no fresh sources"
    ).expect("metric can be created");

    pub static ref CONSENSUS_CONFIDENCE: IntGauge = IntGauge::new(
        "consensus_confidence_percent",
        "Confidence of the latest consensus reading"
    ).expect("metric can be created");

    pub static ref CONSENSUS_PRICE: Gauge = Gauge::new(
        "consensus_price",
        "Latest consensus price"
    ).expect("metric can be created");

    pub static ref SUBMISSIONS_REJECTED: IntCounter = IntCounter::new(
        "price_submissions_rejected_total",
        "Price submissions rejected as invalid or out of order"
    ).expect("metric can be created");

    // Health metrics
    pub static ref PROBE_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "source_probe_latency_seconds",
            "Round-trip latency of source health probes"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
    ).expect("metric can be created");

    pub static ref SOURCES_OFFLINE: IntGauge = IntGauge::new(
        "sources_offline",
        "Sources reported offline by the last health check"
    ).expect("metric can be created");
}

/// Registers every metric with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() -> Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PRICE_CHECKS.clone()),
        Box::new(PRICE_CHECKS_REJECTED.clone()),
        Box::new(BREAKER_TRIGGERS.clone()),
        Box::new(BREAKER_RESETS.clone()),
        Box::new(BREAKER_TRIGGERED.clone()),
        Box::new(CONSENSUS_ROUNDS.clone()),
        Box::new(CONSENSUS_FAILURES.clone()),
        Box::new(CONSENSUS_CONFIDENCE.clone()),
        Box::new(CONSENSUS_PRICE.clone()),
        Box::new(SUBMISSIONS_REJECTED.clone()),
        Box::new(PROBE_LATENCY.clone()),
        Box::new(SOURCES_OFFLINE.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Prometheus text exposition of [`REGISTRY`].
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        register_metrics().unwrap();
        register_metrics().unwrap();

        PRICE_CHECKS.inc();
        let text = gather_text().unwrap();
        assert!(text.contains("breaker_price_checks_total"));
    }
}
