//! Notification types and the EventBus
//!
//! Every outward notification produced by the playback controller is a
//! [`PlayerEvent`]. Producers only see the fire-and-forget [`EventSink`] trait;
//! the [`EventBus`] implementation fans notifications out to any number of
//! subscribers (SSE clients, tests, an embedding UI).

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// Normalized backend log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
}

/// Where a started track came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackOrigin {
    /// Automatic advancement through the active playback context
    Context,
    /// Explicit "play next" request from the lookahead queue
    Queue,
}

/// Outward notification
///
/// The serialized `type` tag doubles as the SSE event name (see [`PlayerEvent::name`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PlayerEvent {
    /// Backend session became usable.
    ///
    /// `error` carries whatever the backend reported alongside the login update,
    /// even on the nominal path.
    LoggedIn { error: Option<String> },

    /// Backend session logged out; callers of the gate will now wait
    LoggedOut,

    ConnectionError { error: String },

    MessageToUser { message: String },

    /// Another client took over playback for this account
    PlayTokenLost,

    StreamingError { error: String },

    ConnectionStateChanged,

    /// Backend log line forwarded for remote observability
    LogMessage {
        level: LogLevel,
        module: String,
        message: String,
    },

    /// A track was loaded and playback started
    PlayTrack {
        uid: String,
        uri: String,
        origin: TrackOrigin,
    },

    /// Loading a resolved track failed; no automatic retry happens
    PlayTrackFailed {
        uid: String,
        uri: String,
        error: String,
    },
}

impl PlayerEvent {
    /// Event name used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::LoggedIn { .. } => "logged-in",
            PlayerEvent::LoggedOut => "logged-out",
            PlayerEvent::ConnectionError { .. } => "connection-error",
            PlayerEvent::MessageToUser { .. } => "message-to-user",
            PlayerEvent::PlayTokenLost => "play-token-lost",
            PlayerEvent::StreamingError { .. } => "streaming-error",
            PlayerEvent::ConnectionStateChanged => "connection-state-changed",
            PlayerEvent::LogMessage { .. } => "log-message",
            PlayerEvent::PlayTrack { .. } => "play-track",
            PlayerEvent::PlayTrackFailed { .. } => "play-track-failed",
        }
    }
}

/// A notification as delivered to subscribers
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Monotonically increasing sequence id (SSE `id:` field)
    pub id: u64,

    #[serde(flatten)]
    pub event: PlayerEvent,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Fire-and-forget notification sink
///
/// No acknowledgment, no delivery guarantee beyond best effort.
pub trait EventSink: Send + Sync {
    fn send_event(&self, event: PlayerEvent);
}

/// Central notification distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use sith_common::events::{EventBus, PlayerEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(PlayerEvent::LoggedOut);
/// let notification = rx.try_recv().unwrap();
/// assert_eq!(notification.event.name(), "logged-out");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Notification>,
    capacity: usize,
    /// Next sequence id; held across `send` so ids reach subscribers in order
    next_id: Arc<Mutex<u64>>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            capacity,
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Subscribe to all future notifications
    ///
    /// Notifications emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Emit a notification to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<Notification>> {
        let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        let notification = Notification {
            id: *next_id,
            event,
            timestamp: chrono::Utc::now(),
        };
        *next_id += 1;
        self.tx.send(notification)
    }

    /// Emit a notification, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.emit(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl EventSink for EventBus {
    fn send_event(&self, event: PlayerEvent) {
        tracing::trace!(event = event.name(), "Emitting notification");
        self.emit_lossy(event);
    }
}
