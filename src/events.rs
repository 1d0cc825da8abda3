use crate::error::{AnimaError, Result};
use crate::models::{ImageSource, Track};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// Provider SDK error classes surfaced by the device listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SdkErrorKind {
    Authentication,
    Account,
    Playback,
}

/// Events published by the capture/analyze/play core.
///
/// The presentation layer renders from these; nothing in the core
/// manipulates the view directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnimaEvent {
    /// Camera access granted and a live stream is open
    CameraStarted { timestamp: SystemTime },
    /// Hardware stream released
    CameraStopped { timestamp: SystemTime },
    /// A still was produced by camera snapshot or file import
    PhotoCaptured { source: ImageSource, bytes: usize },
    /// The live image was discarded (retake or dispose)
    CaptureDiscarded,
    /// Classification returned an emotion and candidate tracks
    AnalysisCompleted {
        emotion: String,
        confidence: f64,
        track_count: usize,
    },
    /// The playback device reported ready with a provider-assigned id
    DeviceReady { device_id: String },
    /// The playback device lost readiness
    DeviceNotReady { device_id: Option<String> },
    /// Playback position/pause projection changed
    PlayerStateChanged {
        paused: bool,
        position_ms: u64,
        duration_ms: u64,
    },
    /// The SDK reported an error through one of its error listeners
    SdkError { kind: SdkErrorKind, message: String },
    /// A play command was accepted by the provider
    PlaybackStarted { track: Track },
    /// A play command was rejected
    PlaybackRejected { track_uri: String, reason: String },
    /// A successful play was appended to the remote history log
    HistoryRecorded { track_uri: String },
    /// Transient, dismissible message for the user
    Notification {
        level: NotificationLevel,
        message: String,
    },
    /// Session torn down (logout)
    SessionEnded { reason: String },
}

impl AnimaEvent {
    /// Informational notification
    pub fn info<S: Into<String>>(message: S) -> Self {
        AnimaEvent::Notification {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    /// Error notification
    pub fn error<S: Into<String>>(message: S) -> Self {
        AnimaEvent::Notification {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            AnimaEvent::CameraStarted { .. } => "Camera started".to_string(),
            AnimaEvent::CameraStopped { .. } => "Camera stopped".to_string(),
            AnimaEvent::PhotoCaptured { source, bytes } => {
                format!("Photo captured from {:?} ({} bytes)", source, bytes)
            }
            AnimaEvent::CaptureDiscarded => "Capture discarded".to_string(),
            AnimaEvent::AnalysisCompleted {
                emotion,
                confidence,
                track_count,
            } => format!(
                "Analysis completed: {} ({:.1}%), {} tracks",
                emotion, confidence, track_count
            ),
            AnimaEvent::DeviceReady { device_id } => format!("Device {} ready", device_id),
            AnimaEvent::DeviceNotReady { device_id } => format!(
                "Device {} not ready",
                device_id.as_deref().unwrap_or("<unassigned>")
            ),
            AnimaEvent::PlayerStateChanged {
                paused,
                position_ms,
                duration_ms,
            } => format!(
                "Player {} at {}/{}ms",
                if *paused { "paused" } else { "playing" },
                position_ms,
                duration_ms
            ),
            AnimaEvent::SdkError { kind, message } => format!("SDK {:?} error: {}", kind, message),
            AnimaEvent::PlaybackStarted { track } => format!("Playing {}", track),
            AnimaEvent::PlaybackRejected { track_uri, reason } => {
                format!("Playback of {} rejected: {}", track_uri, reason)
            }
            AnimaEvent::HistoryRecorded { track_uri } => format!("History recorded: {}", track_uri),
            AnimaEvent::Notification { level, message } => format!("[{:?}] {}", level, message),
            AnimaEvent::SessionEnded { reason } => format!("Session ended: {}", reason),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            AnimaEvent::CameraStarted { .. } => "camera_started",
            AnimaEvent::CameraStopped { .. } => "camera_stopped",
            AnimaEvent::PhotoCaptured { .. } => "photo_captured",
            AnimaEvent::CaptureDiscarded => "capture_discarded",
            AnimaEvent::AnalysisCompleted { .. } => "analysis_completed",
            AnimaEvent::DeviceReady { .. } => "device_ready",
            AnimaEvent::DeviceNotReady { .. } => "device_not_ready",
            AnimaEvent::PlayerStateChanged { .. } => "player_state_changed",
            AnimaEvent::SdkError { .. } => "sdk_error",
            AnimaEvent::PlaybackStarted { .. } => "playback_started",
            AnimaEvent::PlaybackRejected { .. } => "playback_rejected",
            AnimaEvent::HistoryRecorded { .. } => "history_recorded",
            AnimaEvent::Notification { .. } => "notification",
            AnimaEvent::SessionEnded { .. } => "session_ended",
        }
    }
}

/// Event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<AnimaEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<AnimaEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter, name: impl Into<String>) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.into())
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: AnimaEvent) -> usize {
        match &event {
            AnimaEvent::DeviceReady { device_id } => {
                info!("Playback device ready: {}", device_id);
            }
            AnimaEvent::DeviceNotReady { device_id } => {
                warn!("Playback device not ready: {:?}", device_id);
            }
            AnimaEvent::SdkError { kind, message } => {
                error!("Playback SDK {:?} error: {}", kind, message);
            }
            AnimaEvent::PlaybackStarted { track } => {
                info!("Playback started: {}", track);
            }
            AnimaEvent::SessionEnded { reason } => {
                info!("Session ended: {}", reason);
            }
            AnimaEvent::PlayerStateChanged { .. } => {
                trace!("Event: {}", event.description());
            }
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        // No subscribers is normal for a headless run
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&AnimaEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &AnimaEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<AnimaEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<AnimaEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event; lagging skips ahead instead of failing
    pub async fn recv(&mut self) -> Result<AnimaEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        trace!("Receiver '{}' received event: {}", self.name, event.description());
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(AnimaError::system("Event bus closed"));
                }
            }
        }
    }

    /// Drain every pending event that passes the filter
    pub fn drain(&mut self) -> Vec<AnimaEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        events.push(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return events,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let delivered = event_bus.publish(AnimaEvent::DeviceReady {
            device_id: "device-1".to_string(),
        });
        assert_eq!(delivered, 1);

        match receiver.recv().await.unwrap() {
            AnimaEvent::DeviceReady { device_id } => assert_eq!(device_id, "device-1"),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(10);
        assert_eq!(event_bus.publish(AnimaEvent::CaptureDiscarded), 0);
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus
            .subscribe_filtered(EventFilter::EventTypes(vec!["notification"]), "toasts");

        event_bus.publish(AnimaEvent::CaptureDiscarded);
        event_bus.publish(AnimaEvent::error("No se pudo analizar la emoción"));

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            AnimaEvent::Notification { level, message } => {
                assert_eq!(level, NotificationLevel::Error);
                assert!(message.contains("No se pudo analizar"));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_drain_collects_pending_events() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe_filtered(EventFilter::All, "drain");

        event_bus.publish(AnimaEvent::info("uno"));
        event_bus.publish(AnimaEvent::info("dos"));

        assert_eq!(receiver.drain().len(), 2);
        assert!(receiver.drain().is_empty());
    }
}
