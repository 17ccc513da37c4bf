use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::events::base::{EventPayload, OracleEvent};
use crate::events::price::{CircuitBreakerReset, CircuitBreakerTriggered, ConfigUpdated, ResetReason};
use crate::interfaces::authorizer::{Authorizer, Role};
use crate::interfaces::event_sink::EventSink;
use crate::observability::metrics::{
    BREAKER_RESETS, BREAKER_TRIGGERED, BREAKER_TRIGGERS, PRICE_CHECKS, PRICE_CHECKS_REJECTED,
};
use crate::price_infra::history::{PriceHistory, PricePoint};
use crate::types::ids::OperatorId;
use crate::types::price::Price;
use crate::types::timestamp::{Clock, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub price_deviation_threshold_bps: u32,
    pub time_window_secs: u64,
    pub cooldown_period_secs: u64,
    pub is_active: bool,
}

impl CircuitBreakerConfig {
    pub const MAX_THRESHOLD_BPS: u32 = 2_000;  // 20%
    pub const MIN_WINDOW_SECS: u64 = 60;
    pub const MIN_COOLDOWN_SECS: u64 = 300;

    pub fn validate(&self) -> Result<()> {
        if self.price_deviation_threshold_bps > Self::MAX_THRESHOLD_BPS {
            return Err(Error::InvalidConfig(format!(
                "deviation threshold {} bps exceeds {} bps",
                self.price_deviation_threshold_bps,
                Self::MAX_THRESHOLD_BPS
            )));
        }
        if self.time_window_secs < Self::MIN_WINDOW_SECS {
            return Err(Error::InvalidConfig(format!(
                "time window {}s is below {}s",
                self.time_window_secs,
                Self::MIN_WINDOW_SECS
            )));
        }
        if self.cooldown_period_secs < Self::MIN_COOLDOWN_SECS {
            return Err(Error::InvalidConfig(format!(
                "cooldown {}s is below {}s",
                self.cooldown_period_secs,
                Self::MIN_COOLDOWN_SECS
            )));
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            price_deviation_threshold_bps: 1_000,  // 10%
            time_window_secs: 300,
            cooldown_period_secs: 3_600,
            is_active: true,
        }
    }
}

/// Outcome of [`CircuitBreaker::check_price`]. A rejection is a normal
/// result, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCheck {
    pub allowed: bool,
    pub deviation_bps: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    Armed,
    Triggered,
}

/// Point-in-time view for dashboards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub state: BreakerState,
    pub triggered_at: Option<Timestamp>,
    pub time_until_reset_secs: u64,
    pub config: CircuitBreakerConfig,
    pub last_price: Option<Price>,
    pub history_len: usize,
}

struct BreakerInner {
    config: CircuitBreakerConfig,
    triggered: bool,
    triggered_at: Option<Timestamp>,
    history: PriceHistory,
}

impl BreakerInner {
    fn reset_due(&self) -> Option<Timestamp> {
        self.triggered_at
            .map(|at| at.plus_secs(self.config.cooldown_period_secs))
            .filter(|_| self.triggered)
    }

    /// Derived state: a stored trip whose cooldown has run out reads as armed.
    fn is_triggered_at(&self, now: Timestamp) -> bool {
        match self.reset_due() {
            Some(due) => now < due,
            None => false,
        }
    }

    fn time_until_reset(&self, now: Timestamp) -> u64 {
        self.reset_due().map(|due| due.secs_since(now)).unwrap_or(0)
    }

    /// Clears a trip whose cooldown has elapsed. Returns true if it did.
    fn settle(&mut self, now: Timestamp) -> bool {
        if self.triggered && !self.is_triggered_at(now) {
            self.triggered = false;
            self.triggered_at = None;
            return true;
        }
        false
    }

    /// First step of every write: clears an expired trip before anything
    /// else changes.
    fn settle_into(&mut self, now: Timestamp, emitted: &mut Vec<EventPayload>) {
        if self.settle(now) {
            emitted.push(EventPayload::CircuitBreakerReset(CircuitBreakerReset {
                timestamp: now,
                reason: ResetReason::CooldownElapsed,
            }));
        }
    }

    /// Oldest accepted price still inside the window, falling back to the
    /// most recent one when the window is empty.
    fn reference(&self, now: Timestamp) -> Option<PricePoint> {
        let cutoff = Timestamp::from_secs(now.as_secs().saturating_sub(self.config.time_window_secs));
        self.history
            .oldest_since(cutoff)
            .or_else(|| self.history.latest())
    }
}

/// Price-deviation circuit breaker.
///
/// Every candidate price is compared with the oldest accepted price inside
/// the configured time window, so a sequence of individually small moves
/// still trips the breaker once the cumulative drift crosses the threshold.
/// A trip re-arms on its own after the cooldown; reads observe that without
/// any explicit reset, and the stored flag is cleared by the next write.
///
/// All writes are serialised through one lock. Events are emitted after the
/// lock is released, in the order the state changed.
pub struct CircuitBreaker {
    inner: RwLock<BreakerInner>,
    clock: Arc<dyn Clock>,
    authorizer: Arc<dyn Authorizer>,
    events: Arc<dyn EventSink>,
}

impl CircuitBreaker {
    pub fn new(
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        authorizer: Arc<dyn Authorizer>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(CircuitBreaker {
            inner: RwLock::new(BreakerInner {
                config,
                triggered: false,
                triggered_at: None,
                history: PriceHistory::new(),
            }),
            clock,
            authorizer,
            events,
        })
    }

    pub fn check_price(&self, candidate: Price) -> Result<PriceCheck> {
        if !candidate.is_positive() {
            return Err(Error::InvalidPrice(candidate.to_string()));
        }

        let mut emitted = Vec::new();

        // Clock is read under the lock so history stays in timestamp order
        let (check, triggered, now) = {
            let mut inner = self.inner.write();
            let now = self.clock.now();
            inner.settle_into(now, &mut emitted);

            let check = if inner.config.is_active && inner.triggered {
                let deviation_bps = inner
                    .history
                    .latest()
                    .map(|last| candidate.deviation_bps(last.price))
                    .unwrap_or(0);
                PriceCheck { allowed: false, deviation_bps }
            } else {
                let reference = inner.reference(now);
                let deviation_bps = reference
                    .map(|r| candidate.deviation_bps(r.price))
                    .unwrap_or(0);

                match reference {
                    Some(reference)
                        if inner.config.is_active
                            && deviation_bps > inner.config.price_deviation_threshold_bps =>
                    {
                        inner.triggered = true;
                        inner.triggered_at = Some(now);
                        emitted.push(EventPayload::CircuitBreakerTriggered(CircuitBreakerTriggered {
                            old_price: reference.price,
                            new_price: candidate,
                            deviation_bps,
                            timestamp: now,
                        }));
                        PriceCheck { allowed: false, deviation_bps }
                    }
                    _ => {
                        inner.history.push(PricePoint { price: candidate, timestamp: now });
                        PriceCheck { allowed: true, deviation_bps }
                    }
                }
            };
            (check, inner.triggered, now)
        };

        PRICE_CHECKS.inc();
        if check.allowed {
            tracing::debug!(%candidate, deviation_bps = check.deviation_bps, "Price accepted");
        } else {
            PRICE_CHECKS_REJECTED.inc();
        }
        self.publish(now, triggered, emitted);

        Ok(check)
    }

    /// Replaces threshold, window and cooldown together. Enforcement
    /// (`is_active`) is left as it is.
    pub fn update_config(
        &self,
        caller: &OperatorId,
        threshold_bps: u32,
        window_secs: u64,
        cooldown_secs: u64,
    ) -> Result<()> {
        self.authorizer.authorize(caller, Role::BreakerAdmin)?;
        let now = self.clock.now();
        let mut emitted = Vec::new();

        let triggered = {
            let mut inner = self.inner.write();
            let candidate = CircuitBreakerConfig {
                price_deviation_threshold_bps: threshold_bps,
                time_window_secs: window_secs,
                cooldown_period_secs: cooldown_secs,
                is_active: inner.config.is_active,
            };
            candidate.validate()?;
            inner.settle_into(now, &mut emitted);
            inner.config = candidate;
            inner.triggered
        };

        tracing::info!(
            operator = %caller,
            threshold_bps,
            window_secs,
            cooldown_secs,
            "Circuit breaker config updated"
        );
        emitted.push(EventPayload::ConfigUpdated(ConfigUpdated {
            threshold_bps,
            window_secs,
            cooldown_secs,
        }));
        self.publish(now, triggered, emitted);
        Ok(())
    }

    pub fn set_active(&self, caller: &OperatorId, active: bool) -> Result<()> {
        self.authorizer.authorize(caller, Role::BreakerAdmin)?;
        let now = self.clock.now();
        let mut emitted = Vec::new();

        let triggered = {
            let mut inner = self.inner.write();
            inner.settle_into(now, &mut emitted);
            inner.config.is_active = active;
            inner.triggered
        };

        if active {
            tracing::info!(operator = %caller, "Circuit breaker enforcement enabled");
        } else {
            tracing::warn!(operator = %caller, "Circuit breaker enforcement disabled");
        }
        self.publish(now, triggered, emitted);
        Ok(())
    }

    /// Re-arms immediately regardless of cooldown. History is kept.
    pub fn emergency_reset(&self, caller: &OperatorId) -> Result<()> {
        self.authorizer.authorize(caller, Role::Emergency)?;
        let now = self.clock.now();
        let mut emitted = Vec::new();

        {
            let mut inner = self.inner.write();
            inner.settle_into(now, &mut emitted);
            inner.triggered = false;
            inner.triggered_at = None;
        }

        tracing::warn!(operator = %caller, "Circuit breaker emergency reset");
        emitted.push(EventPayload::CircuitBreakerReset(CircuitBreakerReset {
            timestamp: now,
            reason: ResetReason::Emergency,
        }));
        self.publish(now, false, emitted);
        Ok(())
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.read().is_triggered_at(self.clock.now())
    }

    pub fn state(&self) -> BreakerState {
        if self.is_triggered() {
            BreakerState::Triggered
        } else {
            BreakerState::Armed
        }
    }

    pub fn time_until_reset(&self) -> u64 {
        self.inner.read().time_until_reset(self.clock.now())
    }

    pub fn triggered_at(&self) -> Option<Timestamp> {
        let inner = self.inner.read();
        if inner.is_triggered_at(self.clock.now()) {
            inner.triggered_at
        } else {
            None
        }
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.inner.read().config
    }

    pub fn last_price(&self) -> Option<Price> {
        self.inner.read().history.latest().map(|p| p.price)
    }

    /// Accepted prices, oldest first.
    pub fn history(&self) -> Vec<PricePoint> {
        self.inner.read().history.to_vec()
    }

    pub fn status(&self) -> BreakerStatus {
        let now = self.clock.now();
        let inner = self.inner.read();
        let triggered = inner.is_triggered_at(now);
        BreakerStatus {
            state: if triggered { BreakerState::Triggered } else { BreakerState::Armed },
            triggered_at: inner.triggered_at.filter(|_| triggered),
            time_until_reset_secs: inner.time_until_reset(now),
            config: inner.config,
            last_price: inner.history.latest().map(|p| p.price),
            history_len: inner.history.len(),
        }
    }

    /// `triggered` is the stored state as left by the write that produced
    /// `payloads`.
    fn publish(&self, now: Timestamp, triggered: bool, payloads: Vec<EventPayload>) {
        BREAKER_TRIGGERED.set(i64::from(triggered));
        for payload in payloads {
            match &payload {
                EventPayload::CircuitBreakerTriggered(t) => {
                    BREAKER_TRIGGERS.inc();
                    tracing::error!(
                        old_price = %t.old_price,
                        new_price = %t.new_price,
                        deviation_bps = t.deviation_bps,
                        "Price circuit breaker triggered"
                    );
                }
                EventPayload::CircuitBreakerReset(r) => {
                    BREAKER_RESETS.inc();
                    tracing::info!(reason = ?r.reason, "Price circuit breaker reset");
                }
                _ => {}
            }
            self.events.emit(OracleEvent::new(now, payload));
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use crate::interfaces::authorizer::AllowAll;
    use crate::interfaces::event_sink::NullEventSink;
    use crate::types::timestamp::ManualClock;

    fn breaker(config: CircuitBreakerConfig) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_000_000)));
        let breaker = CircuitBreaker::new(config, clock.clone(), Arc::new(AllowAll), Arc::new(NullEventSink))
            .unwrap();
        (breaker, clock)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn deviation_gating_and_cooldown(
            reference in 1i64..=10_000_000_000_000,
            candidate in 1i64..=10_000_000_000_000,
            threshold in 0u32..=2_000,
            cooldown in 300u64..=86_400,
        ) {
            let (breaker, clock) = breaker(CircuitBreakerConfig {
                price_deviation_threshold_bps: threshold,
                time_window_secs: 300,
                cooldown_period_secs: cooldown,
                is_active: true,
            });

            breaker.check_price(Price::from_raw(reference)).unwrap();
            let check = breaker.check_price(Price::from_raw(candidate)).unwrap();

            let expected = u32::try_from((candidate as i128 - reference as i128).abs() * 10_000 / reference as i128)
                .unwrap_or(u32::MAX);
            prop_assert_eq!(check.deviation_bps, expected);

            if expected > threshold {
                prop_assert!(!check.allowed);
                prop_assert!(breaker.is_triggered());

                clock.advance(cooldown - 1);
                prop_assert!(breaker.is_triggered());
                clock.advance(1);
                prop_assert!(!breaker.is_triggered());
            } else {
                prop_assert!(check.allowed);
                prop_assert!(!breaker.is_triggered());
            }
        }

        #[test]
        fn history_never_exceeds_capacity(accepted in 0usize..300) {
            let (breaker, clock) = breaker(CircuitBreakerConfig::default());
            for _ in 0..accepted {
                breaker.check_price(Price::from_units(42)).unwrap();
                clock.advance(1);
            }

            let history = breaker.history();
            prop_assert_eq!(history.len(), accepted.min(100));
            if let Some(first) = history.first() {
                let expected_first = 1_000_000 + accepted.saturating_sub(100) as u64;
                prop_assert_eq!(first.timestamp.as_secs(), expected_first);
            }
        }

        #[test]
        fn rejected_config_update_changes_nothing(
            threshold in 0u32..=4_000,
            window in 0u64..=600,
            cooldown in 0u64..=1_200,
        ) {
            let (breaker, _) = breaker(CircuitBreakerConfig::default());
            let before = breaker.config();
            let caller = OperatorId::new();

            let result = breaker.update_config(&caller, threshold, window, cooldown);
            let valid = threshold <= 2_000 && window >= 60 && cooldown >= 300;

            prop_assert_eq!(result.is_ok(), valid);
            if !valid {
                prop_assert_eq!(breaker.config(), before);
            }
        }
    }
}
