//! Playback sequencing: collections, contexts and the sequencer loop

pub mod collection;
pub mod context;
pub mod sequencer;

pub use collection::{PlaylistTracks, TrackCollection};
pub use context::PlaybackContext;
pub use sequencer::{PlaybackSequencer, RunningSequencer, SequencerHandle};
