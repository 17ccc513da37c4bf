use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::Instrument;
use crate::error::{ErrorKind, Result};
use crate::observability::tracing::trace_consensus_round;
use crate::price_infra::aggregator::{ConsensusReading, OracleAggregator};
use crate::price_infra::circuit_breaker::{CircuitBreaker, PriceCheck};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    pub reading: ConsensusReading,
    pub check: PriceCheck,
}

/// Drives the price pipeline: recompute consensus, then gate the result
/// through the circuit breaker. Neither component knows about the other.
pub struct PriceKeeper {
    aggregator: Arc<OracleAggregator>,
    breaker: Arc<CircuitBreaker>,
    interval: Duration,
    rounds: AtomicU64,
}

impl PriceKeeper {
    pub fn new(aggregator: Arc<OracleAggregator>, breaker: Arc<CircuitBreaker>, interval: Duration) -> Self {
        PriceKeeper {
            aggregator,
            breaker,
            interval,
            rounds: AtomicU64::new(0),
        }
    }

    pub fn run_round(&self) -> Result<RoundOutcome> {
        let reading = self.aggregator.compute_consensus()?;
        let check = self.breaker.check_price(reading.price)?;

        if !check.allowed {
            tracing::warn!(
                price = %reading.price,
                deviation_bps = check.deviation_bps,
                time_until_reset = self.breaker.time_until_reset(),
                "Consensus price held back by circuit breaker"
            );
        }

        Ok(RoundOutcome { reading, check })
    }

    /// Runs rounds forever. Rounds that fail for lack of data are logged and
    /// retried on the next tick; anything else stops the keeper.
    pub async fn run(self) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let round = self.rounds.fetch_add(1, Ordering::Relaxed) + 1;

            let result = async { self.run_round() }
                .instrument(trace_consensus_round(round))
                .await;

            match result {
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    if e.kind() == ErrorKind::NoFreshSources {
                        tracing::warn!(round, "Skipping round: {}", e);
                    } else {
                        tracing::error!(round, "Round rejected: {}", e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }
}
