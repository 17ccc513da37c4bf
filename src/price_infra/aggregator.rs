use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::events::base::{EventPayload, OracleEvent};
use crate::events::price::PriceAggregated;
use crate::interfaces::authorizer::{Authorizer, Role};
use crate::interfaces::event_sink::EventSink;
use crate::observability::metrics::{
    CONSENSUS_CONFIDENCE, CONSENSUS_FAILURES, CONSENSUS_PRICE, CONSENSUS_ROUNDS, SUBMISSIONS_REJECTED,
};
use crate::price_infra::health::{run_probes, HealthProbe, InferredProbe, SourceHealth, WebSocketProbe};
use crate::types::ids::{OperatorId, SourceId};
use crate::types::price::Price;
use crate::types::timestamp::{Clock, Timestamp};

pub const MAX_WEIGHT_BPS: u32 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSource {
    pub id: SourceId,
    pub weight_bps: u32,
    pub max_staleness_secs: u64,
    pub last_price: Option<Price>,
    pub last_update: Option<Timestamp>,
    pub active: bool,
    pub endpoint: Option<String>,
}

impl PriceSource {
    /// Active, has reported, and the last report is within its staleness bound.
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        self.active
            && self.last_price.is_some()
            && self
                .last_update
                .is_some_and(|at| now.secs_since(at) <= self.max_staleness_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusReading {
    pub price: Price,
    pub timestamp: Timestamp,
    /// Percentage of active sources that were fresh, 0..=100.
    pub confidence: u8,
    /// Sources that contributed, in registration order.
    pub contributing_sources: Vec<SourceId>,
}

#[derive(Default)]
struct AggregatorInner {
    sources: Vec<PriceSource>,
    index: HashMap<SourceId, usize>,
    current: Option<ConsensusReading>,
}

impl AggregatorInner {
    fn get_mut(&mut self, id: &SourceId) -> Result<&mut PriceSource> {
        let idx = *self.index.get(id).ok_or_else(|| Error::UnknownSource(id.clone()))?;
        Ok(&mut self.sources[idx])
    }
}

/// Weighted multi-source price consensus.
///
/// Sources are registered by an oracle admin and then report prices through
/// [`submit_price`](Self::submit_price). [`compute_consensus`](Self::compute_consensus)
/// filters sources by their own staleness bound at call time and averages
/// the survivors by weight. Sources are never deleted, only deactivated.
pub struct OracleAggregator {
    inner: RwLock<AggregatorInner>,
    probes: RwLock<HashMap<SourceId, Arc<dyn HealthProbe>>>,
    clock: Arc<dyn Clock>,
    authorizer: Arc<dyn Authorizer>,
    events: Arc<dyn EventSink>,
}

impl OracleAggregator {
    pub fn new(clock: Arc<dyn Clock>, authorizer: Arc<dyn Authorizer>, events: Arc<dyn EventSink>) -> Self {
        OracleAggregator {
            inner: RwLock::new(AggregatorInner::default()),
            probes: RwLock::new(HashMap::new()),
            clock,
            authorizer,
            events,
        }
    }

    pub fn add_oracle(
        &self,
        caller: &OperatorId,
        id: impl Into<SourceId>,
        weight_bps: u32,
        max_staleness_secs: u64,
    ) -> Result<()> {
        self.register(caller, id.into(), weight_bps, max_staleness_secs, None)
    }

    /// Registers a network source; the health check probes `endpoint`.
    pub fn add_oracle_with_endpoint(
        &self,
        caller: &OperatorId,
        id: impl Into<SourceId>,
        weight_bps: u32,
        max_staleness_secs: u64,
        endpoint: impl Into<String>,
    ) -> Result<()> {
        self.register(caller, id.into(), weight_bps, max_staleness_secs, Some(endpoint.into()))
    }

    fn register(
        &self,
        caller: &OperatorId,
        id: SourceId,
        weight_bps: u32,
        max_staleness_secs: u64,
        endpoint: Option<String>,
    ) -> Result<()> {
        self.authorizer.authorize(caller, Role::OracleAdmin)?;

        if weight_bps == 0 || weight_bps > MAX_WEIGHT_BPS {
            return Err(Error::InvalidWeight(weight_bps));
        }
        if max_staleness_secs == 0 {
            return Err(Error::InvalidStaleness(id));
        }

        {
            let mut inner = self.inner.write();
            if inner.index.contains_key(&id) {
                return Err(Error::DuplicateSource(id));
            }
            let idx = inner.sources.len();
            inner.sources.push(PriceSource {
                id: id.clone(),
                weight_bps,
                max_staleness_secs,
                last_price: None,
                last_update: None,
                active: true,
                endpoint: endpoint.clone(),
            });
            inner.index.insert(id.clone(), idx);
        }

        if let Some(url) = &endpoint {
            self.probes.write().insert(id.clone(), Arc::new(WebSocketProbe::new(url.clone())));
        }

        tracing::info!(operator = %caller, source = %id, weight_bps, max_staleness_secs, "Price source added");
        Ok(())
    }

    /// Deactivates the source. Its configuration and last report are kept.
    pub fn remove_oracle(&self, caller: &OperatorId, id: &SourceId) -> Result<()> {
        self.set_oracle_active(caller, id, false)
    }

    pub fn set_oracle_active(&self, caller: &OperatorId, id: &SourceId, active: bool) -> Result<()> {
        self.authorizer.authorize(caller, Role::OracleAdmin)?;
        self.inner.write().get_mut(id)?.active = active;
        tracing::info!(operator = %caller, source = %id, active, "Price source activation changed");
        Ok(())
    }

    /// Replaces the liveness probe used for `id` by the health check.
    pub fn set_probe(&self, id: &SourceId, probe: Arc<dyn HealthProbe>) -> Result<()> {
        if !self.inner.read().index.contains_key(id) {
            return Err(Error::UnknownSource(id.clone()));
        }
        self.probes.write().insert(id.clone(), probe);
        Ok(())
    }

    /// Records the latest observation for a source. Timestamps must strictly
    /// increase per source and may not be ahead of the clock.
    pub fn submit_price(&self, id: &SourceId, price: Price, timestamp: Timestamp) -> Result<()> {
        let result = self.try_submit(id, price, timestamp);
        if let Err(e) = &result {
            SUBMISSIONS_REJECTED.inc();
            tracing::warn!(source = %id, %price, timestamp = timestamp.as_secs(), "Price submission rejected: {}", e);
        }
        result
    }

    fn try_submit(&self, id: &SourceId, price: Price, timestamp: Timestamp) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let source = inner.get_mut(id)?;

        if !price.is_positive() {
            return Err(Error::InvalidPrice(price.to_string()));
        }
        if timestamp > now {
            return Err(Error::FutureTimestamp {
                source_id: id.clone(),
                submitted: timestamp,
                now,
            });
        }
        if let Some(last) = source.last_update {
            if timestamp <= last {
                return Err(Error::StalePrice {
                    source_id: id.clone(),
                    submitted: timestamp,
                    last,
                });
            }
        }

        source.last_price = Some(price);
        source.last_update = Some(timestamp);
        tracing::debug!(source = %id, %price, timestamp = timestamp.as_secs(), "Price submitted");
        Ok(())
    }

    pub fn compute_consensus(&self) -> Result<ConsensusReading> {
        let (reading, now) = {
            let mut inner = self.inner.write();
            let now = self.clock.now();
            let active = inner.sources.iter().filter(|s| s.active).count();
            let fresh: Vec<&PriceSource> = inner.sources.iter().filter(|s| s.is_fresh(now)).collect();

            if fresh.is_empty() {
                drop(inner);
                CONSENSUS_FAILURES.inc();
                tracing::warn!(active, "No fresh price sources");
                return Err(Error::NoFreshSources { active });
            }

            let price = Price::weighted_mean(
                fresh.iter().filter_map(|s| s.last_price.map(|p| (p, s.weight_bps))),
            )
            .ok_or(Error::NoFreshSources { active })?;

            let reading = ConsensusReading {
                price,
                timestamp: now,
                confidence: (fresh.len() * 100 / active) as u8,
                contributing_sources: fresh.iter().map(|s| s.id.clone()).collect(),
            };
            inner.current = Some(reading.clone());
            (reading, now)
        };

        CONSENSUS_ROUNDS.inc();
        CONSENSUS_CONFIDENCE.set(reading.confidence as i64);
        CONSENSUS_PRICE.set(reading.price.to_f64());
        tracing::info!(
            price = %reading.price,
            confidence = reading.confidence,
            sources = reading.contributing_sources.len(),
            "Consensus price computed"
        );

        self.events.emit(OracleEvent::new(
            now,
            EventPayload::PriceAggregated(PriceAggregated {
                price: reading.price,
                timestamp: reading.timestamp,
                confidence: reading.confidence,
                oracle_count: reading.contributing_sources.len(),
            }),
        ));

        Ok(reading)
    }

    /// Last computed reading, without recomputing.
    pub fn latest_price(&self) -> Result<ConsensusReading> {
        self.inner.read().current.clone().ok_or(Error::NoPriceAvailable)
    }

    /// Probes every registered source concurrently. Sources with an endpoint
    /// get a network probe; the rest are judged by staleness and activation.
    pub async fn check_oracle_health(&self, timeout: Duration) -> Vec<SourceHealth> {
        let now = self.clock.now();
        let sources = self.sources();
        let targets = {
            let probes = self.probes.read();
            sources
                .into_iter()
                .map(|source| {
                    let probe = probes
                        .get(&source.id)
                        .cloned()
                        .unwrap_or_else(|| Arc::new(InferredProbe) as Arc<dyn HealthProbe>);
                    (source, probe)
                })
                .collect::<Vec<_>>()
        };
        run_probes(targets, now, timeout).await
    }

    /// Registry snapshot in registration order.
    pub fn sources(&self) -> Vec<PriceSource> {
        self.inner.read().sources.clone()
    }

    pub fn source(&self, id: &SourceId) -> Option<PriceSource> {
        let inner = self.inner.read();
        inner.index.get(id).map(|&idx| inner.sources[idx].clone())
    }

    pub fn source_count(&self) -> usize {
        self.inner.read().sources.len()
    }
}
