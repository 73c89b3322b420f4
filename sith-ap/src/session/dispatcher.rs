//! Session event dispatcher
//!
//! The one consumer of backend lifecycle events. It owns the write side of the
//! [`AvailabilityGate`] and is the only producer of session notifications, so
//! subscribers see them exactly once and in arrival order.
//!
//! States: `AwaitingLogin -> LoggedIn -> LoggedOut`, with `Stopped` reached only
//! through shutdown (or the backend dropping its event stream).
//!
//! The loop waits on the event stream and the shutdown signal together with
//! `tokio::select!`, so a shutdown request is seen as soon as it is sent. When
//! shutdown arrives while logged in, the dispatcher issues a logout and keeps
//! running until the backend confirms it with a logout update.

use super::gate::AvailabilityGate;
use super::{BackendLogMessage, Session, SessionEvent};
use crate::playback::SequencerHandle;
use sith_common::events::{EventSink, LogLevel, PlayerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Target used when re-emitting backend log lines
const BACKEND_LOG_TARGET: &str = "sith_ap::backend";

/// Dispatcher lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    AwaitingLogin,
    LoggedIn,
    LoggedOut,
    Stopped,
}

/// Handle to a running dispatcher
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<DispatcherState>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn state(&self) -> DispatcherState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state transitions
    pub fn watch_state(&self) -> watch::Receiver<DispatcherState> {
        self.state_rx.clone()
    }

    /// Request shutdown and wait for the loop to finish
    ///
    /// When logged in this does not return until the backend has reported the
    /// logout.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Dispatcher task ended abnormally: {}", e);
        }
    }
}

/// Backend event loop state
pub struct SessionEventDispatcher {
    session: Arc<dyn Session>,
    gate: AvailabilityGate,
    sink: Arc<dyn EventSink>,
    sequencer: SequencerHandle,
    settle_delay: Duration,
    stopping: bool,
    state_tx: watch::Sender<DispatcherState>,
}

impl SessionEventDispatcher {
    pub fn new(
        session: Arc<dyn Session>,
        gate: AvailabilityGate,
        sink: Arc<dyn EventSink>,
        sequencer: SequencerHandle,
        settle_delay: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(DispatcherState::AwaitingLogin);
        Self {
            session,
            gate,
            sink,
            sequencer,
            settle_delay,
            stopping: false,
            state_tx,
        }
    }

    /// Spawn the loop consuming `events`
    pub fn spawn(self, events: mpsc::UnboundedReceiver<SessionEvent>) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state_rx = self.state_tx.subscribe();
        let task = tokio::spawn(self.run(events, shutdown_rx));
        DispatcherHandle {
            shutdown_tx,
            state_rx,
            task,
        }
    }

    fn state(&self) -> DispatcherState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: DispatcherState) {
        debug!(?state, "Dispatcher state change");
        self.state_tx.send_replace(state);
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Session event dispatcher started");
        loop {
            tokio::select! {
                biased;

                // A dropped sender counts as a shutdown request too.
                _ = shutdown_rx.changed(), if !self.stopping => {
                    if self.begin_shutdown() {
                        break;
                    }
                }

                event = events.recv() => match event {
                    Some(event) => {
                        if self.handle_event(event).await {
                            break;
                        }
                    }
                    None => {
                        warn!("Backend event stream closed");
                        break;
                    }
                },
            }
        }
        self.set_state(DispatcherState::Stopped);
        info!("Session event dispatcher stopped");
    }

    /// Returns true when the loop can end right away
    fn begin_shutdown(&mut self) -> bool {
        self.stopping = true;
        if self.state() != DispatcherState::LoggedIn {
            return true;
        }

        info!("Logging out before shutdown");
        match self.session.logout() {
            Ok(()) => false,
            Err(e) => {
                // No logout is outstanding, so there is nothing to wait for.
                error!("Logout failed: {}", e);
                true
            }
        }
    }

    /// Returns true when the loop should end
    async fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::LoginUpdate { error } => {
                tokio::time::sleep(self.settle_delay).await;
                self.gate.resume();
                self.set_state(DispatcherState::LoggedIn);
                match &error {
                    Some(e) => error!("Login reported an error: {}", e),
                    None => info!("Logged in, session available"),
                }
                self.sink.send_event(PlayerEvent::LoggedIn { error });
            }
            SessionEvent::LogoutUpdate => {
                self.gate.suspend();
                self.set_state(DispatcherState::LoggedOut);
                warn!("Logged out, session suspended");
                self.sink.send_event(PlayerEvent::LoggedOut);
                return self.stopping;
            }
            SessionEvent::ConnectionError(error) => {
                warn!("Connection error: {}", error);
                self.sink.send_event(PlayerEvent::ConnectionError { error });
            }
            SessionEvent::MessageToUser(message) => {
                info!("Message to user: {}", message);
                self.sink.send_event(PlayerEvent::MessageToUser { message });
            }
            SessionEvent::PlayTokenLost => {
                warn!("Play token lost");
                self.sink.send_event(PlayerEvent::PlayTokenLost);
            }
            SessionEvent::StreamingError(error) => {
                error!("Streaming error: {}", error);
                self.sink.send_event(PlayerEvent::StreamingError { error });
            }
            SessionEvent::ConnectionStateChanged => {
                debug!("Connection state changed");
                self.sink.send_event(PlayerEvent::ConnectionStateChanged);
            }
            SessionEvent::EndOfTrack => {
                debug!("End of track");
                self.sequencer.end_of_track();
            }
            SessionEvent::LogMessage(message) => {
                let module = log_backend_message(&message);
                self.sink.send_event(PlayerEvent::LogMessage {
                    level: message.level,
                    module,
                    message: message.message,
                });
            }
        }
        false
    }
}

/// Re-emit a backend log line through tracing, returning the normalized module
///
/// The backend appends `:line` to module names; only the module is kept.
fn log_backend_message(message: &BackendLogMessage) -> String {
    let module = message
        .module
        .split_once(':')
        .map(|(module, _)| module)
        .unwrap_or(&message.module)
        .to_string();
    let text = &message.message;

    match message.level {
        LogLevel::Fatal => {
            error!(target: BACKEND_LOG_TARGET, module = %module, fatal = true, "{}", text)
        }
        LogLevel::Error => error!(target: BACKEND_LOG_TARGET, module = %module, "{}", text),
        LogLevel::Warning => warn!(target: BACKEND_LOG_TARGET, module = %module, "{}", text),
        LogLevel::Info => info!(target: BACKEND_LOG_TARGET, module = %module, "{}", text),
        LogLevel::Debug => debug!(target: BACKEND_LOG_TARGET, module = %module, "{}", text),
    }

    module
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_line_suffix_stripped() {
        let message = BackendLogMessage {
            level: LogLevel::Info,
            module: "ap:1234".to_string(),
            message: "Connecting".to_string(),
        };
        assert_eq!(log_backend_message(&message), "ap");
    }

    #[test]
    fn test_module_without_suffix_kept() {
        let message = BackendLogMessage {
            level: LogLevel::Fatal,
            module: "audio".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(log_backend_message(&message), "audio");
    }
}
