//! Abstractly indexed track collections
//!
//! Playback contexts only ever ask a collection for its length and for the
//! track at an index. Two sources exist: a live backend playlist whose length
//! and order may change between calls, and a search result fixed when the
//! search completed.

use crate::error::{Error, Result};
use crate::session::TrackRef;
use std::fmt;
use std::sync::Arc;

/// Live, backend-owned playlist
///
/// Implementations read straight through to the backend; consecutive calls may
/// observe different contents.
pub trait PlaylistTracks: Send + Sync {
    fn len(&self) -> usize;

    fn track(&self, index: usize) -> Result<TrackRef>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered collection a playback context walks through
#[derive(Clone)]
pub enum TrackCollection {
    /// Backed by the live backend playlist object
    Playlist(Arc<dyn PlaylistTracks>),
    /// Backed by a completed search, fixed at construction
    Search(Arc<[TrackRef]>),
}

impl TrackCollection {
    pub fn playlist(playlist: Arc<dyn PlaylistTracks>) -> Self {
        TrackCollection::Playlist(playlist)
    }

    pub fn search_results(tracks: Vec<TrackRef>) -> Self {
        TrackCollection::Search(tracks.into())
    }

    pub fn len(&self) -> usize {
        match self {
            TrackCollection::Playlist(playlist) => playlist.len(),
            TrackCollection::Search(tracks) => tracks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Track at `index`
    pub fn get(&self, index: usize) -> Result<TrackRef> {
        match self {
            TrackCollection::Playlist(playlist) => playlist.track(index),
            TrackCollection::Search(tracks) => {
                tracks
                    .get(index)
                    .cloned()
                    .ok_or(Error::TrackIndexOutOfRange {
                        index,
                        len: tracks.len(),
                    })
            }
        }
    }
}

impl fmt::Debug for TrackCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackCollection::Playlist(playlist) => f
                .debug_struct("Playlist")
                .field("len", &playlist.len())
                .finish(),
            TrackCollection::Search(tracks) => {
                f.debug_struct("Search").field("len", &tracks.len()).finish()
            }
        }
    }
}
