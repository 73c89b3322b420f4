//! # Sith Common Library
//!
//! Shared code for the sith playback controller:
//! - Error types
//! - Notification types (PlayerEvent) and the EventBus
//! - Bootstrap configuration loading

pub mod config;
pub mod error;
pub mod events;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventBus, EventSink, Notification, PlayerEvent};
