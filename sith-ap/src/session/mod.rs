//! Backend session seam
//!
//! The streaming backend is an external collaborator. This module defines the
//! small surface the controller needs from it ([`Session`], [`SessionEvent`],
//! [`TrackRef`]) plus the two components that track its availability:
//! the [`AvailabilityGate`] and the [`SessionEventDispatcher`].

pub mod dispatcher;
pub mod gate;

pub use dispatcher::{DispatcherHandle, DispatcherState, SessionEventDispatcher};
pub use gate::AvailabilityGate;

use crate::error::Result;
use sith_common::events::LogLevel;

/// Handle to a playable track
///
/// `uri` is the track's own identity. `uid` identifies this particular
/// occurrence within a collection, so the same track listed twice gets two
/// different UIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackRef {
    pub uri: String,
    pub uid: String,
}

impl TrackRef {
    pub fn new(uri: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            uid: uid.into(),
        }
    }
}

/// Commands the controller issues against the backend session
///
/// The backend guarantees these are safe to call from several threads at once;
/// the controller adds no locking of its own around them.
pub trait Session: Send + Sync + 'static {
    /// Resolve a track URI into a playable handle
    fn parse_link(&self, uri: &str) -> Result<TrackRef>;

    /// Load a track into the backend player
    fn load(&self, track: &TrackRef) -> Result<()>;

    /// Start (or resume) playback of the loaded track
    fn play(&self);

    fn pause(&self);

    /// Drop the loaded track
    fn unload(&self);

    /// Begin logging out; completion arrives later as [`SessionEvent::LogoutUpdate`]
    fn logout(&self) -> Result<()>;
}

/// Lifecycle events produced asynchronously by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Login attempt finished; `error` is set when the backend reported one
    LoginUpdate { error: Option<String> },
    LogoutUpdate,
    ConnectionError(String),
    MessageToUser(String),
    PlayTokenLost,
    EndOfTrack,
    StreamingError(String),
    ConnectionStateChanged,
    LogMessage(BackendLogMessage),
}

/// A log line emitted by the backend library
#[derive(Debug, Clone, PartialEq)]
pub struct BackendLogMessage {
    pub level: LogLevel,
    /// Emitting module, possibly suffixed with `:line`
    pub module: String,
    pub message: String,
}
