//! Playback sequencer
//!
//! Single-owner loop deciding what plays next. Play requests, queue requests
//! and end-of-track signals all travel through one FIFO command channel, so
//! they are handled strictly in arrival order by a single task.
//!
//! Per command:
//! 1. `Play` replaces the active context (even mid-track) and starts its first track.
//! 2. `EndOfTrack` pops the lookahead queue if it has anything, otherwise
//!    advances the context.
//! 3. `Queue` only appends to the lookahead queue.
//!
//! Load failures are reported as `play-track-failed` and never retried here;
//! the next end-of-track or play request moves things along.

use super::collection::TrackCollection;
use super::context::PlaybackContext;
use crate::error::{Error, Result};
use crate::session::{Session, TrackRef};
use sith_common::events::{EventSink, PlayerEvent, TrackOrigin};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
enum SequencerCommand {
    Play {
        collection: TrackCollection,
        start_index: usize,
    },
    Queue(TrackRef),
    EndOfTrack,
}

/// Outcome of deciding what comes next
#[derive(Debug)]
enum NextTrack {
    Track(TrackRef, TrackOrigin),
    /// The context has nothing playable; the session must be stopped
    Exhausted,
    /// No context and nothing queued
    Idle,
}

/// Cloneable entry point into the sequencer loop
#[derive(Clone)]
pub struct SequencerHandle {
    tx: mpsc::UnboundedSender<SequencerCommand>,
    session: Arc<dyn Session>,
}

impl SequencerHandle {
    /// Replace the active context and start playing at `start_index`
    pub fn play(&self, collection: TrackCollection, start_index: usize) -> Result<()> {
        debug!(?collection, start_index, "Play requested");
        self.send(SequencerCommand::Play {
            collection,
            start_index,
        })
    }

    /// Resolve `uri` and append it to the lookahead queue
    ///
    /// Link errors are returned to the caller; nothing is queued in that case.
    pub fn queue(&self, uri: &str) -> Result<()> {
        let track = self.session.parse_link(uri)?;
        self.queue_track(track)
    }

    /// Append an already resolved track to the lookahead queue
    pub fn queue_track(&self, track: TrackRef) -> Result<()> {
        debug!(uid = %track.uid, uri = %track.uri, "Queue requested");
        self.send(SequencerCommand::Queue(track))
    }

    /// Signal that the current track finished
    pub fn end_of_track(&self) {
        if self.send(SequencerCommand::EndOfTrack).is_err() {
            debug!("End of track after sequencer shutdown, ignoring");
        }
    }

    fn send(&self, command: SequencerCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::ShuttingDown)
    }
}

/// Running sequencer task
pub struct RunningSequencer {
    handle: SequencerHandle,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RunningSequencer {
    pub fn handle(&self) -> SequencerHandle {
        self.handle.clone()
    }

    /// Stop the loop and wait for it to exit
    ///
    /// Backend calls already in flight finish; no further ones are issued.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Sequencer task ended abnormally: {}", e);
        }
    }
}

/// Loop state, owned exclusively by the sequencer task
pub struct PlaybackSequencer {
    session: Arc<dyn Session>,
    sink: Arc<dyn EventSink>,
    queue: VecDeque<TrackRef>,
    context: Option<PlaybackContext>,
}

impl PlaybackSequencer {
    pub fn new(session: Arc<dyn Session>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            session,
            sink,
            queue: VecDeque::new(),
            context: None,
        }
    }

    /// Spawn the loop on the current tokio runtime
    pub fn spawn(self) -> RunningSequencer {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = SequencerHandle {
            tx,
            session: Arc::clone(&self.session),
        };

        let task = tokio::spawn(self.run(rx, shutdown_rx));
        info!("Playback sequencer started");

        RunningSequencer {
            handle,
            shutdown_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<SequencerCommand>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => break,

                command = rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }
        info!("Playback sequencer stopped");
    }

    fn handle_command(&mut self, command: SequencerCommand) {
        let next = match command {
            SequencerCommand::Queue(track) => {
                self.queue.push_back(track);
                debug!(queued = self.queue.len(), "Track queued");
                return;
            }
            SequencerCommand::Play {
                collection,
                start_index,
            } => {
                let mut context = PlaybackContext::new(collection, start_index);
                let started = context.start();
                self.context = Some(context);
                Self::context_result(started)
            }
            SequencerCommand::EndOfTrack => self.next_track(),
        };

        match next {
            Ok(NextTrack::Track(track, origin)) => self.load_and_play(track, origin),
            Ok(NextTrack::Exhausted) => {
                info!("Playback context is empty, stopping playback");
                self.stop_session();
            }
            Ok(NextTrack::Idle) => debug!("Nothing to play"),
            Err(e) => {
                error!("Failed to fetch next track from context: {}", e);
                self.stop_session();
            }
        }
    }

    /// Lookahead queue first, then the context
    fn next_track(&mut self) -> Result<NextTrack> {
        if let Some(track) = self.queue.pop_front() {
            if self.queue.is_empty() {
                // Give the allocation back so an idle player doesn't hold it.
                self.queue = VecDeque::new();
            }
            return Ok(NextTrack::Track(track, TrackOrigin::Queue));
        }

        match self.context.as_mut() {
            Some(context) => Self::context_result(context.advance()),
            None => Ok(NextTrack::Idle),
        }
    }

    fn context_result(result: Result<Option<TrackRef>>) -> Result<NextTrack> {
        Ok(match result? {
            Some(track) => NextTrack::Track(track, TrackOrigin::Context),
            None => NextTrack::Exhausted,
        })
    }

    fn load_and_play(&self, track: TrackRef, origin: TrackOrigin) {
        if let Err(e) = self.session.load(&track) {
            warn!(uid = %track.uid, uri = %track.uri, "Failed to load track: {}", e);
            self.sink.send_event(PlayerEvent::PlayTrackFailed {
                uid: track.uid,
                uri: track.uri,
                error: e.to_string(),
            });
            return;
        }

        self.session.play();
        info!(uid = %track.uid, uri = %track.uri, ?origin, "Playing track");
        self.sink.send_event(PlayerEvent::PlayTrack {
            uid: track.uid,
            uri: track.uri,
            origin,
        });
    }

    fn stop_session(&self) {
        self.session.pause();
        self.session.unload();
    }
}
