use std::sync::Arc;
use std::time::Duration;
use crate::error::{Error, ErrorKind, Result};
use crate::price_infra::aggregator::OracleAggregator;
use crate::price_infra::connectors::PriceConnector;
use crate::price_infra::RawPriceUpdate;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Debug)]
pub struct FeedSettings {
    /// Longest wait for a single message before the connection counts as stalled.
    pub message_timeout: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        FeedSettings {
            message_timeout: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// Pumps a streaming connector into the aggregator's submission path.
///
/// Exchange streams carry many trades per second but source timestamps are
/// whole seconds, so updates are held until their second closes and only the
/// last one of each second is submitted.
pub struct PriceFeed {
    connector: Box<dyn PriceConnector>,
    aggregator: Arc<OracleAggregator>,
    settings: FeedSettings,
    pending: Option<RawPriceUpdate>,
    last_submitted: Option<Timestamp>,
}

impl PriceFeed {
    pub fn new(connector: Box<dyn PriceConnector>, aggregator: Arc<OracleAggregator>, settings: FeedSettings) -> Self {
        PriceFeed {
            connector,
            aggregator,
            settings,
            pending: None,
            last_submitted: None,
        }
    }

    /// Runs until the connector cannot be re-established. Rejected
    /// submissions (duplicates, out-of-order trades) are skipped.
    pub async fn run(mut self) -> Result<()> {
        let mut failures = 0u32;
        let mut needs_connect = true;

        loop {
            if needs_connect || !self.connector.is_healthy() {
                if let Err(e) = self.connector.connect().await {
                    tracing::warn!(
                        source = %self.connector.source_id(),
                        attempt = failures + 1,
                        "Feed connection failed: {}",
                        e
                    );
                    self.record_failure(&mut failures)?;
                    tokio::time::sleep(self.settings.reconnect_delay).await;
                    continue;
                }
                needs_connect = false;
            }

            match tokio::time::timeout(self.settings.message_timeout, self.connector.next_price()).await {
                Ok(Ok(update)) => {
                    failures = 0;
                    self.accept(update)?;
                }
                Ok(Err(e)) => {
                    tracing::warn!(source = %self.connector.source_id(), "Feed read failed: {}", e);
                    self.flush()?;
                    self.record_failure(&mut failures)?;
                    needs_connect = true;
                }
                Err(_) => {
                    let stalled = Error::Timeout(self.settings.message_timeout.as_millis() as u64);
                    tracing::warn!(source = %self.connector.source_id(), "Feed stalled: {}", stalled);
                    self.flush()?;
                    self.record_failure(&mut failures)?;
                    needs_connect = true;
                }
            }
        }
    }

    /// Holds `update` until a later second arrives. Within one second the
    /// latest update replaces the held one.
    fn accept(&mut self, update: RawPriceUpdate) -> Result<()> {
        if self.last_submitted.is_some_and(|last| update.timestamp <= last) {
            tracing::debug!(source = %update.source_id, timestamp = update.timestamp.as_secs(), "Late update dropped");
            return Ok(());
        }

        match self.pending.as_ref().map(|held| held.timestamp) {
            Some(held) if update.timestamp == held => self.pending = Some(update),
            Some(held) if update.timestamp < held => {
                tracing::debug!(source = %update.source_id, timestamp = update.timestamp.as_secs(), "Out-of-order update dropped");
            }
            _ => {
                if let Some(ready) = self.pending.replace(update) {
                    self.submit(ready)?;
                }
            }
        }
        Ok(())
    }

    /// Submits the held update, if any.
    fn flush(&mut self) -> Result<()> {
        match self.pending.take() {
            Some(ready) => self.submit(ready),
            None => Ok(()),
        }
    }

    fn submit(&mut self, update: RawPriceUpdate) -> Result<()> {
        self.last_submitted = Some(update.timestamp);
        match self.aggregator.submit_price(&update.source_id, update.price, update.timestamp) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind(), ErrorKind::StaleData | ErrorKind::Validation) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn record_failure(&self, failures: &mut u32) -> Result<()> {
        *failures += 1;
        if *failures > self.settings.max_reconnect_attempts {
            tracing::error!(source = %self.connector.source_id(), "Feed giving up after {} failures", failures);
            return Err(Error::MaxReconnectAttemptsExceeded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use crate::interfaces::authorizer::AllowAll;
    use crate::interfaces::event_sink::NullEventSink;
    use crate::price_infra::connectors::MockPriceConnector;
    use crate::price_infra::RawPriceUpdate;
    use crate::types::ids::{OperatorId, SourceId};
    use crate::types::price::Price;
    use crate::types::timestamp::{ManualClock, Timestamp};

    fn update(units: i64, secs: u64) -> RawPriceUpdate {
        RawPriceUpdate {
            source_id: SourceId::new("binance"),
            price: Price::from_units(units),
            timestamp: Timestamp::from_secs(secs),
        }
    }

    #[tokio::test]
    async fn submits_updates_and_gives_up_after_reconnects() {
        let aggregator = Arc::new(OracleAggregator::new(
            Arc::new(ManualClock::new(Timestamp::from_secs(1_000))),
            Arc::new(AllowAll),
            Arc::new(NullEventSink),
        ));
        aggregator.add_oracle(&OperatorId::new(), "binance", 10_000, 60).unwrap();

        let connected = Arc::new(AtomicBool::new(false));
        let connects = Arc::new(AtomicUsize::new(0));
        let reads = Arc::new(AtomicUsize::new(0));

        let mut connector = MockPriceConnector::new();
        connector.expect_source_id().return_const(SourceId::new("binance"));
        {
            let connected = connected.clone();
            connector.expect_is_healthy().returning(move || connected.load(Ordering::SeqCst));
        }
        {
            let connected = connected.clone();
            let connects = connects.clone();
            connector.expect_connect().returning(move || {
                if connects.fetch_add(1, Ordering::SeqCst) == 0 {
                    connected.store(true, Ordering::SeqCst);
                    Ok(())
                } else {
                    Err(Error::ConnectorError("refused".into()))
                }
            });
        }
        {
            let connected = connected.clone();
            let reads = reads.clone();
            connector.expect_next_price().returning(move || match reads.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(update(100, 100)),
                1 => Ok(update(99, 100)),
                2 => Ok(update(101, 101)),
                _ => {
                    connected.store(false, Ordering::SeqCst);
                    Err(Error::ConnectionClosed)
                }
            });
        }

        let feed = PriceFeed::new(
            Box::new(connector),
            aggregator.clone(),
            FeedSettings {
                message_timeout: Duration::from_secs(1),
                max_reconnect_attempts: 2,
                reconnect_delay: Duration::from_millis(1),
            },
        );

        let result = feed.run().await;
        assert!(matches!(result, Err(Error::MaxReconnectAttemptsExceeded)));

        let source = aggregator.source(&SourceId::new("binance")).unwrap();
        assert_eq!(source.last_price, Some(Price::from_units(101)));
        assert_eq!(source.last_update, Some(Timestamp::from_secs(101)));
    }

    #[test]
    fn trades_within_one_second_collapse_to_the_last() {
        let aggregator = Arc::new(OracleAggregator::new(
            Arc::new(ManualClock::new(Timestamp::from_secs(1_000))),
            Arc::new(AllowAll),
            Arc::new(NullEventSink),
        ));
        aggregator.add_oracle(&OperatorId::new(), "binance", 10_000, 60).unwrap();
        let mut feed = PriceFeed::new(Box::new(MockPriceConnector::new()), aggregator.clone(), FeedSettings::default());
        let latest = || {
            let source = aggregator.source(&SourceId::new("binance")).unwrap();
            (source.last_price, source.last_update)
        };

        for units in [100, 105, 103] {
            feed.accept(update(units, 500)).unwrap();
        }
        assert_eq!(latest(), (None, None));

        feed.accept(update(110, 501)).unwrap();
        assert_eq!(latest(), (Some(Price::from_units(103)), Some(Timestamp::from_secs(500))));

        feed.accept(update(111, 501)).unwrap();
        feed.accept(update(90, 499)).unwrap();
        feed.accept(update(95, 500)).unwrap();
        feed.flush().unwrap();
        assert_eq!(latest(), (Some(Price::from_units(111)), Some(Timestamp::from_secs(501))));

        feed.accept(update(112, 501)).unwrap();
        feed.flush().unwrap();
        assert_eq!(latest(), (Some(Price::from_units(111)), Some(Timestamp::from_secs(501))));
    }
}
