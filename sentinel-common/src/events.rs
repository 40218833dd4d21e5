//! The internal event bus. Grounded on `wkmp-common/src/events/mod.rs`'s
//! `EventBus` (a thin `tokio::sync::broadcast` wrapper); `SentinelEvent`
//! replaces `WkmpEvent`'s variants with the closed set from spec §6.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Per-subscriber queue depth (spec §5: "bounded per-subscriber queue
/// (≈200). On overflow, the subscriber is silently dropped.").
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SentinelEvent {
    Status {
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    MonitoringState {
        timestamp: DateTime<Utc>,
        active: bool,
    },
    ManualStateChange {
        timestamp: DateTime<Utc>,
        key: String,
        value: serde_json::Value,
    },
    WebhookStateChange {
        timestamp: DateTime<Utc>,
        configured: bool,
    },
    MqttStateChange {
        timestamp: DateTime<Utc>,
        enabled: bool,
    },
    MqttConfigSaved {
        timestamp: DateTime<Utc>,
    },
    ScanResult {
        timestamp: DateTime<Utc>,
        found: usize,
    },
    PairSuccess {
        timestamp: DateTime<Utc>,
        device_id: i64,
    },
    DeviceStatus {
        timestamp: DateTime<Utc>,
        device_id: i64,
        status: String,
        error: Option<String>,
    },
    NowPlaying {
        timestamp: DateTime<Utc>,
        device_id: i64,
        video_id: String,
        current_time: Option<f64>,
        duration: Option<f64>,
        play_state: Option<String>,
    },
    UpNext {
        timestamp: DateTime<Utc>,
        device_id: i64,
        video_id: String,
    },
    SponsorblockSkip {
        timestamp: DateTime<Utc>,
        device_id: i64,
        video_id: String,
        seek_to: f64,
    },
    SponsorblockError {
        timestamp: DateTime<Utc>,
        device_id: i64,
        video_id: String,
        error: String,
    },
    SponsorblockStateChange {
        timestamp: DateTime<Utc>,
        active: bool,
    },
    InterventionPlaySafe {
        timestamp: DateTime<Utc>,
        device_id: i64,
        video_id: String,
    },
    InterventionPlaySafeReinforce {
        timestamp: DateTime<Utc>,
        device_id: i64,
        video_id: String,
    },
    InterventionError {
        timestamp: DateTime<Utc>,
        device_id: i64,
        error: String,
    },
    JudgeFailure {
        timestamp: DateTime<Utc>,
        error: String,
    },
    RemoteReleaseChange {
        timestamp: DateTime<Utc>,
        active: bool,
        until: Option<DateTime<Utc>>,
    },
}

impl SentinelEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SentinelEvent::Status { timestamp, .. }
            | SentinelEvent::MonitoringState { timestamp, .. }
            | SentinelEvent::ManualStateChange { timestamp, .. }
            | SentinelEvent::WebhookStateChange { timestamp, .. }
            | SentinelEvent::MqttStateChange { timestamp, .. }
            | SentinelEvent::MqttConfigSaved { timestamp }
            | SentinelEvent::ScanResult { timestamp, .. }
            | SentinelEvent::PairSuccess { timestamp, .. }
            | SentinelEvent::DeviceStatus { timestamp, .. }
            | SentinelEvent::NowPlaying { timestamp, .. }
            | SentinelEvent::UpNext { timestamp, .. }
            | SentinelEvent::SponsorblockSkip { timestamp, .. }
            | SentinelEvent::SponsorblockError { timestamp, .. }
            | SentinelEvent::SponsorblockStateChange { timestamp, .. }
            | SentinelEvent::InterventionPlaySafe { timestamp, .. }
            | SentinelEvent::InterventionPlaySafeReinforce { timestamp, .. }
            | SentinelEvent::InterventionError { timestamp, .. }
            | SentinelEvent::JudgeFailure { timestamp, .. }
            | SentinelEvent::RemoteReleaseChange { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SentinelEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SentinelEvent> {
        self.tx.subscribe()
    }

    /// Emits and reports the subscriber count reached, matching the
    /// teacher's `emit` (non-lossy signature, used where the caller wants
    /// to know delivery fan-out).
    pub fn emit(
        &self,
        event: SentinelEvent,
    ) -> Result<usize, broadcast::error::SendError<SentinelEvent>> {
        self.tx.send(event)
    }

    /// Fire-and-forget; the bus never blocks or panics producers even when
    /// there are no subscribers.
    pub fn emit_lossy(&self, event: SentinelEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(SUBSCRIBER_QUEUE_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit_lossy(SentinelEvent::MqttConfigSaved {
            timestamp: Utc::now(),
        });
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, SentinelEvent::MqttConfigSaved { .. }));
    }

    #[test]
    fn emit_lossy_never_panics_without_subscribers() {
        let bus = EventBus::default();
        bus.emit_lossy(SentinelEvent::MqttConfigSaved {
            timestamp: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
