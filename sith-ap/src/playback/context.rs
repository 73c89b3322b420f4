//! Resumable cursor into a track collection
//!
//! The cursor alone is not enough to know where playback is: a live playlist
//! can be reordered or edited between two tracks. The context therefore also
//! remembers the UID of the last track it handed out and, before each advance,
//! checks that the cursor still points at it.
//!
//! Reconciliation is best effort. If the last played UID was removed from the
//! collection the context simply continues from the cursor, which can skip or
//! repeat a track when the collection is edited concurrently.

use super::collection::TrackCollection;
use crate::error::Result;
use crate::session::TrackRef;
use tracing::{debug, warn};

/// Active collection plus traversal state
#[derive(Debug, Clone)]
pub struct PlaybackContext {
    collection: TrackCollection,
    last_played: Option<TrackRef>,
    cursor: usize,
}

impl PlaybackContext {
    pub fn new(collection: TrackCollection, start_index: usize) -> Self {
        Self {
            collection,
            last_played: None,
            cursor: start_index,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn last_played(&self) -> Option<&TrackRef> {
        self.last_played.as_ref()
    }

    /// Track at the start index, wrapped into range
    ///
    /// `Ok(None)` means the collection is empty and nothing can be played.
    pub fn start(&mut self) -> Result<Option<TrackRef>> {
        let len = self.collection.len();
        if len == 0 {
            return Ok(None);
        }
        self.cursor %= len;
        self.take_at_cursor().map(Some)
    }

    /// Move to the next track, reconciling the cursor first
    ///
    /// `Ok(None)` means the collection is empty and nothing can be played.
    pub fn advance(&mut self) -> Result<Option<TrackRef>> {
        let len = self.collection.len();
        if len == 0 {
            return Ok(None);
        }
        // The collection may have shrunk, or never been seen non-empty.
        self.cursor %= len;
        self.reconcile(len);
        self.cursor = (self.cursor + 1) % len;
        self.take_at_cursor().map(Some)
    }

    fn take_at_cursor(&mut self) -> Result<TrackRef> {
        let track = self.collection.get(self.cursor)?;
        self.last_played = Some(track.clone());
        Ok(track)
    }

    /// Point the cursor back at `last_played` if the collection moved it
    fn reconcile(&mut self, len: usize) {
        let Some(last) = self.last_played.as_ref() else {
            return;
        };

        if let Ok(track) = self.collection.get(self.cursor) {
            if track.uid == last.uid {
                return;
            }
        }

        let found = (0..len).find(|&index| {
            self.collection
                .get(index)
                .map(|track| track.uid == last.uid)
                .unwrap_or(false)
        });

        match found {
            Some(index) => {
                debug!(
                    uid = %last.uid,
                    from = self.cursor,
                    to = index,
                    "Collection changed, resuming after last played track"
                );
                self.cursor = index;
            }
            None => {
                warn!(
                    uid = %last.uid,
                    cursor = self.cursor,
                    "Last played track no longer in collection, continuing from cursor"
                );
            }
        }
    }
}
