//! Player service
//!
//! Owns the running pieces of the controller and the order they are torn down
//! in. Client requests (play, queue, audio delivery) enter through here.

use crate::audio::{AudioFormat, AudioOutputPipeline};
use crate::error::{Error, Result};
use crate::playback::{PlaybackSequencer, RunningSequencer, SequencerHandle, TrackCollection};
use crate::session::{
    AvailabilityGate, DispatcherHandle, DispatcherState, Session, SessionEvent,
    SessionEventDispatcher,
};
use sith_common::events::EventSink;
use sith_common::Config;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct PlayerService {
    gate: AvailabilityGate,
    sequencer: SequencerHandle,
    running_sequencer: Mutex<Option<RunningSequencer>>,
    dispatcher: Mutex<Option<DispatcherHandle>>,
    pipeline: Arc<AudioOutputPipeline>,
    accepting: AtomicBool,
}

impl PlayerService {
    /// Start the sequencer and dispatcher tasks on the current runtime
    ///
    /// `events` carries the backend's lifecycle events; `pipeline` is already
    /// running and is shut down last by [`stop`](Self::stop).
    pub fn start(
        config: &Config,
        session: Arc<dyn Session>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        sink: Arc<dyn EventSink>,
        pipeline: AudioOutputPipeline,
    ) -> Self {
        let gate = AvailabilityGate::new();

        let running_sequencer =
            PlaybackSequencer::new(Arc::clone(&session), Arc::clone(&sink)).spawn();
        let sequencer = running_sequencer.handle();

        let dispatcher = SessionEventDispatcher::new(
            session,
            gate.clone(),
            sink,
            sequencer.clone(),
            config.session.settle_delay(),
        )
        .spawn(events);

        info!("Player service started");

        Self {
            gate,
            sequencer,
            running_sequencer: Mutex::new(Some(running_sequencer)),
            dispatcher: Mutex::new(Some(dispatcher)),
            pipeline: Arc::new(pipeline),
            accepting: AtomicBool::new(true),
        }
    }

    pub fn gate(&self) -> &AvailabilityGate {
        &self.gate
    }

    pub fn pipeline(&self) -> &AudioOutputPipeline {
        &self.pipeline
    }

    /// Dispatcher lifecycle state; `Stopped` once stop completed
    pub fn session_state(&self) -> DispatcherState {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(DispatcherHandle::state)
            .unwrap_or(DispatcherState::Stopped)
    }

    /// Wait for the session, then play `collection` from `start_index`
    pub async fn play(&self, collection: TrackCollection, start_index: usize) -> Result<()> {
        self.ensure_accepting()?;
        self.gate.await_ready_async().await;
        self.ensure_accepting()?;
        self.sequencer.play(collection, start_index)
    }

    /// Wait for the session, then queue `uri` to play next
    pub async fn queue(&self, uri: &str) -> Result<()> {
        self.ensure_accepting()?;
        self.gate.await_ready_async().await;
        self.ensure_accepting()?;
        self.sequencer.queue(uri)
    }

    /// Backend audio delivery; see [`AudioOutputPipeline::write_audio`]
    pub fn write_audio(&self, format: AudioFormat, bytes: &[u8]) -> usize {
        if !self.accepting.load(Ordering::Acquire) {
            return 0;
        }
        self.pipeline.write_audio(format, bytes)
    }

    /// Shut everything down
    ///
    /// Order: refuse new work, stop the sequencer, log out and stop the
    /// dispatcher, stop audio output. Safe to call more than once.
    ///
    /// Requests parked on the gate are released and fail with
    /// [`Error::ShuttingDown`].
    pub async fn stop(&self) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("Player service stopping");
        self.gate.close();

        let sequencer = self
            .running_sequencer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sequencer) = sequencer {
            sequencer.shutdown().await;
        }

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.shutdown().await;
        }

        let pipeline = Arc::clone(&self.pipeline);
        if let Err(e) = tokio::task::spawn_blocking(move || pipeline.shutdown()).await {
            warn!("Audio pipeline shutdown task failed: {}", e);
        }

        info!("Player service stopped");
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.accepting.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }
}
