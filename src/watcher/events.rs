//! Events emitted by the log tail watcher and their fan-out channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default capacity of each event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// A decoded status line from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    /// Source (agent) that wrote the line.
    pub source_name: String,
    /// Decoded JSON payload.
    pub data: serde_json::Value,
    /// When the line was captured, not when it was written.
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    /// Create an update event stamped with the current time.
    #[must_use]
    pub fn new(source_name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            source_name: source_name.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// A failure surfaced on the error channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Source the failure relates to, if any.
    pub source_name: Option<String>,
    /// Human-readable description.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEvent {
    #[must_use]
    pub fn new(source_name: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.map(String::from),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Two named broadcast channels: "update" and "error".
///
/// Any number of consumers may subscribe at any time; dropping a receiver
/// unsubscribes it. Emitting with nobody listening is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    update_tx: broadcast::Sender<StatusEvent>,
    error_tx: broadcast::Sender<ErrorEvent>,
}

impl EventBus {
    /// Create a bus whose channels each buffer `capacity` events.
    ///
    /// A capacity of 0 is raised to 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (update_tx, _) = broadcast::channel(capacity);
        let (error_tx, _) = broadcast::channel(capacity);
        Self {
            update_tx,
            error_tx,
        }
    }

    /// Subscribe to the "update" channel.
    #[must_use]
    pub fn subscribe_updates(&self) -> broadcast::Receiver<StatusEvent> {
        self.update_tx.subscribe()
    }

    /// Subscribe to the "error" channel.
    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorEvent> {
        self.error_tx.subscribe()
    }

    /// Number of live "update" subscribers.
    #[must_use]
    pub fn update_subscribers(&self) -> usize {
        self.update_tx.receiver_count()
    }

    /// Number of live "error" subscribers.
    #[must_use]
    pub fn error_subscribers(&self) -> usize {
        self.error_tx.receiver_count()
    }

    pub(crate) fn emit_update(&self, event: StatusEvent) {
        let _ = self.update_tx.send(event);
    }

    pub(crate) fn emit_error(&self, event: ErrorEvent) {
        let _ = self.error_tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_event_wire_shape() {
        let event = StatusEvent::new(
            "agent1",
            serde_json::json!({"model": {"display_name": "Sonnet"}}),
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["sourceName"], "agent1");
        assert_eq!(json["data"]["model"]["display_name"], "Sonnet");
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_error_event_creation() {
        let event = ErrorEvent::new(Some("agent1"), "watch failed");
        assert_eq!(event.source_name.as_deref(), Some("agent1"));
        assert_eq!(event.message, "watch failed");
        assert!(event.timestamp <= Utc::now());
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.emit_update(StatusEvent::new("agent1", serde_json::json!({})));
        bus.emit_error(ErrorEvent::new(None, "nobody listening"));
        assert_eq!(bus.update_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let bus = EventBus::default();
        let mut first = bus.subscribe_updates();
        let mut second = bus.subscribe_updates();
        assert_eq!(bus.update_subscribers(), 2);

        bus.emit_update(StatusEvent::new("agent1", serde_json::json!({"n": 1})));

        assert_eq!(first.recv().await.unwrap().data["n"], 1);
        assert_eq!(second.recv().await.unwrap().data["n"], 1);
    }

    #[tokio::test]
    async fn test_channels_are_separate() {
        let bus = EventBus::default();
        let mut updates = bus.subscribe_updates();
        let mut errors = bus.subscribe_errors();

        bus.emit_error(ErrorEvent::new(Some("agent2"), "boom"));

        assert_eq!(errors.recv().await.unwrap().message, "boom");
        assert!(matches!(
            updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_dropping_receiver_unsubscribes() {
        let bus = EventBus::default();
        let rx = bus.subscribe_errors();
        assert_eq!(bus.error_subscribers(), 1);
        drop(rx);
        assert_eq!(bus.error_subscribers(), 0);
    }
}
