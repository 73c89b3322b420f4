//! # Sith Audio Player Library (sith-ap)
//!
//! Background playback controller for a streaming-music backend session.
//!
//! **Purpose:** Gate client requests on session availability, drive the
//! backend's lifecycle events, sequence tracks from a playback context and a
//! lookahead queue, and render delivered PCM to the sound card.
//!
//! **Architecture:** two tokio tasks (session event dispatcher, playback
//! sequencer) plus one dedicated audio output thread, wired together by
//! [`service::PlayerService`]. [`server::Server`] serves the HTTP surface
//! around it.

pub mod api;
pub mod audio;
pub mod error;
pub mod logging;
pub mod playback;
pub mod server;
pub mod service;
pub mod session;

pub use error::{Error, Result};
pub use service::PlayerService;
