//! Lifecycle events published by the queue controller.
//!
//! Events are fire-and-forget: they go out on a broadcast channel and a
//! missing or lagging subscriber never blocks the queue. Per item, `start`
//! always precedes any `progress`, and exactly one of `finish`/`fail` ends it.

use serde::Serialize;
use tokio::sync::broadcast;

use super::MediaId;

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A queue lifecycle notification.
///
/// Serializes with an `event` tag carrying the wire name (`add`, `remove`,
/// `pause`, `resume`, `clear-queue`, `start`, `progress`, `finish`, `fail`,
/// `ffmpeg-danger`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum QueueEvent {
    /// An item was appended (or reloaded); `value` is its URL.
    Add { id: MediaId, value: String },
    /// A pending item was removed.
    Remove { id: MediaId },
    /// Processing will stop before the next item.
    Pause,
    /// Processing is allowed again.
    Resume,
    /// The pending queue was purged.
    ClearQueue,
    /// An engine started working on an item.
    Start { id: MediaId, url: String },
    /// Percentage progress for the in-flight item.
    Progress { id: MediaId, url: String, value: f64 },
    /// The item downloaded successfully.
    Finish { id: MediaId },
    /// The item failed; it is not retried.
    Fail { id: MediaId },
    /// The transcoding engine is selected but not installed.
    FfmpegDanger,
}

impl QueueEvent {
    /// Returns the wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::ClearQueue => "clear-queue",
            Self::Start { .. } => "start",
            Self::Progress { .. } => "progress",
            Self::Finish { .. } => "finish",
            Self::Fail { .. } => "fail",
            Self::FfmpegDanger => "ffmpeg-danger",
        }
    }

    /// Returns true for `finish` and `fail`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Fail { .. })
    }
}

/// Broadcast fan-out for [`QueueEvent`]s.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: QueueEvent) {
        tracing::trace!(event = event.name(), "queue event");
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_wire_name() {
        let json = serde_json::to_value(QueueEvent::Add {
            id: MediaId::from(1_i64),
            value: "http://x/a.m3u8".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "add");
        assert_eq!(json["id"], 1);
        assert_eq!(json["value"], "http://x/a.m3u8");

        let json = serde_json::to_value(QueueEvent::ClearQueue).unwrap();
        assert_eq!(json["event"], "clear-queue");
        let json = serde_json::to_value(QueueEvent::FfmpegDanger).unwrap();
        assert_eq!(json["event"], "ffmpeg-danger");
    }

    #[test]
    fn test_event_name_matches_serialized_tag() {
        let events = [
            QueueEvent::Pause,
            QueueEvent::Resume,
            QueueEvent::Finish { id: "a".into() },
            QueueEvent::Fail { id: "a".into() },
            QueueEvent::Progress {
                id: "a".into(),
                url: String::new(),
                value: 50.0,
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.name());
        }
    }

    #[test]
    fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.emit(QueueEvent::Pause);
        let mut rx = bus.subscribe();
        bus.emit(QueueEvent::Resume);
        assert_eq!(rx.try_recv().unwrap(), QueueEvent::Resume);
    }
}
