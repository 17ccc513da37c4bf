use parking_lot::Mutex;
use tokio::sync::broadcast;
use crate::events::base::{EventType, OracleEvent};

/// Outbound channel for aggregator and breaker events. Implementations must
/// not block: components call `emit` on their write path.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OracleEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: OracleEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<OracleEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OracleEvent> {
        self.events.lock().clone()
    }

    pub fn of_type(&self, event_type: EventType) -> Vec<OracleEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: OracleEvent) {
        self.events.lock().push(event);
    }
}

/// Fan-out to any number of async subscribers (dashboards, the token layer).
/// Slow subscribers lag and lose the oldest events; the sender never waits.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<OracleEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        BroadcastEventSink { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OracleEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: OracleEvent) {
        // Err only means nobody is listening right now
        let _ = self.sender.send(event);
    }
}

/// Writes one structured log line per event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: OracleEvent) {
        match serde_json::to_string(&event.payload) {
            Ok(payload) => tracing::info!(
                event_id = %event.event_id,
                event_type = ?event.event_type,
                timestamp = event.timestamp.as_secs(),
                %payload,
                "oracle event"
            ),
            Err(e) => tracing::warn!(event_id = %event.event_id, "Unserializable event payload: {}", e),
        }
    }
}

/// Sends each event to several sinks in order.
pub struct FanoutEventSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        FanoutEventSink { sinks }
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: OracleEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::events::base::EventPayload;
    use crate::events::price::ConfigUpdated;
    use crate::types::timestamp::Timestamp;

    fn config_event() -> OracleEvent {
        OracleEvent::new(
            Timestamp::from_secs(42),
            EventPayload::ConfigUpdated(ConfigUpdated {
                threshold_bps: 500,
                window_secs: 300,
                cooldown_secs: 3600,
            }),
        )
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();

        sink.emit(config_event());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::ConfigUpdated);
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        let sink = BroadcastEventSink::new(8);
        sink.emit(config_event());
    }

    #[test]
    fn fanout_delivers_to_every_sink() {
        let a = Arc::new(MemoryEventSink::new());
        let b = Arc::new(MemoryEventSink::new());
        let fanout = FanoutEventSink::new(vec![a.clone(), b.clone(), Arc::new(NullEventSink)]);

        fanout.emit(config_event());

        assert_eq!(a.events().len(), 1);
        assert_eq!(b.of_type(EventType::ConfigUpdated).len(), 1);
    }
}
