//! Test doubles for sith-ap integration tests
//!
//! - MockSession: records backend calls, scripted load failures
//! - ScriptedPlaylist: a live playlist tests can edit between end-of-track events
//! - MockAudioBackend: records the stream lifecycle and every written sample

#![allow(dead_code)]

use sith_ap::audio::{AudioBackend, StreamParams};
use sith_ap::error::{Error, Result};
use sith_ap::playback::PlaylistTracks;
use sith_ap::session::{Session, SessionEvent, TrackRef};
use sith_common::events::{Notification, PlayerEvent};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// `spotify:track:<id>` with uid `<id>`
pub fn track(id: &str) -> TrackRef {
    TrackRef::new(format!("spotify:track:{}", id), id)
}

pub fn tracks(ids: &[&str]) -> Vec<TrackRef> {
    ids.iter().map(|id| track(id)).collect()
}

/// Next notification, failing the test if none arrives in time
pub async fn next_event(rx: &mut broadcast::Receiver<Notification>) -> PlayerEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("event bus closed")
        .event
}

/// Uid of the next `play-track` notification, skipping nothing else
pub async fn next_played(rx: &mut broadcast::Receiver<Notification>) -> String {
    match next_event(rx).await {
        PlayerEvent::PlayTrack { uid, .. } => uid,
        other => panic!("expected play-track, got {:?}", other),
    }
}

// ------------------------------------------------------------------------------------------------
// MockSession
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Load(String),
    Play,
    Pause,
    Unload,
    Logout,
}

#[derive(Default)]
pub struct MockSession {
    calls: Mutex<Vec<SessionCall>>,
    failing_loads: Mutex<HashSet<String>>,
    fail_logout: AtomicBool,
    /// When set, a logout call answers with a LogoutUpdate on this channel
    logout_reply: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
    /// Precede the LogoutUpdate reply with an EndOfTrack
    track_ends_on_logout: AtomicBool,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::Load(uid) => Some(uid),
                _ => None,
            })
            .collect()
    }

    pub fn fail_load(&self, uid: &str) {
        self.failing_loads.lock().unwrap().insert(uid.to_string());
    }

    pub fn fail_logout(&self) {
        self.fail_logout.store(true, Ordering::SeqCst);
    }

    pub fn reply_to_logout(&self, events: mpsc::UnboundedSender<SessionEvent>) {
        *self.logout_reply.lock().unwrap() = Some(events);
    }

    /// A track finishing while logout is in flight
    pub fn end_track_on_logout(&self) {
        self.track_ends_on_logout.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: SessionCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Session for MockSession {
    fn parse_link(&self, uri: &str) -> Result<TrackRef> {
        match uri.strip_prefix("spotify:track:") {
            Some(id) if !id.is_empty() => Ok(TrackRef::new(uri, id)),
            _ => Err(Error::Session(format!("Invalid link: {}", uri))),
        }
    }

    fn load(&self, track: &TrackRef) -> Result<()> {
        self.record(SessionCall::Load(track.uid.clone()));
        if self.failing_loads.lock().unwrap().contains(&track.uid) {
            return Err(Error::Session(format!("Track {} is not available", track.uid)));
        }
        Ok(())
    }

    fn play(&self) {
        self.record(SessionCall::Play);
    }

    fn pause(&self) {
        self.record(SessionCall::Pause);
    }

    fn unload(&self) {
        self.record(SessionCall::Unload);
    }

    fn logout(&self) -> Result<()> {
        self.record(SessionCall::Logout);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(Error::Session("Logout rejected".to_string()));
        }
        if let Some(events) = self.logout_reply.lock().unwrap().as_ref() {
            if self.track_ends_on_logout.load(Ordering::SeqCst) {
                let _ = events.send(SessionEvent::EndOfTrack);
            }
            let _ = events.send(SessionEvent::LogoutUpdate);
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// ScriptedPlaylist
// ------------------------------------------------------------------------------------------------

/// Playlist whose contents tests change while playback is running
pub struct ScriptedPlaylist {
    tracks: Mutex<Vec<TrackRef>>,
}

impl ScriptedPlaylist {
    pub fn new(tracks: Vec<TrackRef>) -> Arc<Self> {
        Arc::new(Self {
            tracks: Mutex::new(tracks),
        })
    }

    pub fn set(&self, tracks: Vec<TrackRef>) {
        *self.tracks.lock().unwrap() = tracks;
    }

    pub fn remove(&self, uid: &str) {
        self.tracks.lock().unwrap().retain(|t| t.uid != uid);
    }
}

impl PlaylistTracks for ScriptedPlaylist {
    fn len(&self) -> usize {
        self.tracks.lock().unwrap().len()
    }

    fn track(&self, index: usize) -> Result<TrackRef> {
        let tracks = self.tracks.lock().unwrap();
        tracks
            .get(index)
            .cloned()
            .ok_or(Error::TrackIndexOutOfRange {
                index,
                len: tracks.len(),
            })
    }
}

// ------------------------------------------------------------------------------------------------
// MockAudioBackend
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Open(StreamParams),
    Start,
    Write(Vec<i16>),
    Stop,
    Close,
    Terminate,
}

/// State shared between a test and the backend living on the output thread
#[derive(Default)]
pub struct BackendRecorder {
    calls: Mutex<Vec<BackendCall>>,
    /// While set, `write` blocks (a device that stopped consuming)
    hold_writes: AtomicBool,
    /// Number of upcoming `open` calls that fail
    failing_opens: AtomicUsize,
}

impl BackendRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than writes, for lifecycle assertions
    pub fn lifecycle(&self) -> Vec<BackendCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, BackendCall::Write(_)))
            .collect()
    }

    pub fn written(&self) -> Vec<i16> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Write(samples) => Some(samples),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn hold_writes(&self, hold: bool) {
        self.hold_writes.store(hold, Ordering::SeqCst);
    }

    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

pub struct MockAudioBackend {
    recorder: Arc<BackendRecorder>,
}

impl MockAudioBackend {
    pub fn new(recorder: Arc<BackendRecorder>) -> Self {
        Self { recorder }
    }
}

impl AudioBackend for MockAudioBackend {
    fn open(&mut self, params: StreamParams) -> Result<()> {
        let failing = self.recorder.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.recorder.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(Error::AudioOutput("Device busy".to_string()));
        }
        self.recorder.record(BackendCall::Open(params));
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.recorder.record(BackendCall::Start);
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        while self.recorder.hold_writes.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.recorder.record(BackendCall::Write(samples.to_vec()));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.recorder.record(BackendCall::Stop);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.recorder.record(BackendCall::Close);
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        self.recorder.record(BackendCall::Terminate);
        Ok(())
    }
}

/// Little-endian bytes for `samples`
pub fn le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Poll `condition` until it holds or the timeout expires
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Async form of [`wait_until`] for tests sharing the runtime with the code under test
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
