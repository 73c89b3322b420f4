//! HTTP surface: health check and the notification stream

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::get,
    Router,
};
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use sith_common::config::EventsConfig;
use sith_common::events::EventBus;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::session::AvailabilityGate;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Session availability, reported by /health
    pub gate: AvailabilityGate,
    /// Notification source for /events
    pub events: EventBus,
    /// SSE keep-alive interval
    pub keep_alive: Duration,
    /// Flips to true when the server shuts down; open SSE streams end then
    pub shutdown: Option<watch::Receiver<bool>>,
}

impl AppState {
    pub fn new(gate: AvailabilityGate, events: EventBus, config: &EventsConfig) -> Self {
        Self {
            gate,
            events,
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", get(event_stream))
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "sith-ap",
        "version": env!("CARGO_PKG_VERSION"),
        "ready": state.gate.is_ready(),
    }))
}

/// GET /events - SSE notification stream
async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|result| async move {
        match result {
            Ok(notification) => {
                let name = notification.event.name();
                match Event::default()
                    .event(name)
                    .id(notification.id.to_string())
                    .json_data(&notification)
                {
                    Ok(event) => Some(Ok(event)),
                    Err(e) => {
                        warn!("Failed to serialize notification {}: {}", name, e);
                        None
                    }
                }
            }
            Err(e) => {
                // Lagged subscriber; the missed ids show up as a gap
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    let shutdown = state.shutdown.clone();
    let stream = stream.take_until(async move {
        match shutdown {
            Some(mut rx) => {
                let _ = rx.wait_for(|&stopping| stopping).await;
            }
            None => std::future::pending::<()>().await,
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.keep_alive)
            .text("keep-alive"),
    )
}
