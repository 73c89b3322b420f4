//! HTTP server wiring
//!
//! Builds the notification bus, the player service and the API router from one
//! [`Config`], serves `/health` and `/events` on `127.0.0.1:<port>`, and stops
//! the service once the HTTP server has drained.
//!
//! The backend session itself is created by the embedder, which hands over the
//! [`Session`] implementation, its event receiver and a running audio pipeline.

use crate::api::{self, AppState};
use crate::audio::AudioOutputPipeline;
use crate::error::{Error, Result};
use crate::service::PlayerService;
use crate::session::{Session, SessionEvent};
use axum::Router;
use sith_common::events::EventBus;
use sith_common::Config;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

/// Read the backend application key named by `session.app_key_path`
pub fn load_app_key(config: &Config) -> Result<Vec<u8>> {
    let path = &config.session.app_key_path;
    let key = std::fs::read(path).map_err(|e| {
        Error::Config(format!("Failed to read app key {}: {}", path.display(), e))
    })?;
    if key.is_empty() {
        return Err(Error::Config(format!("App key {} is empty", path.display())));
    }
    info!(path = %path.display(), bytes = key.len(), "Loaded app key");
    Ok(key)
}

/// Bound listener plus everything it serves
pub struct Server {
    listener: TcpListener,
    router: Router,
    service: Arc<PlayerService>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Start the player service and bind the HTTP listener
    ///
    /// Port 0 binds an ephemeral port; see [`local_addr`](Self::local_addr).
    pub async fn bind(
        config: &Config,
        session: Arc<dyn Session>,
        session_events: mpsc::UnboundedReceiver<SessionEvent>,
        pipeline: AudioOutputPipeline,
    ) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            Error::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let events = EventBus::new(config.events.capacity);
        let service = Arc::new(PlayerService::start(
            config,
            session,
            session_events,
            Arc::new(events.clone()),
            pipeline,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState::new(service.gate().clone(), events, &config.events)
            .with_shutdown(shutdown_rx);

        info!("Starting HTTP server on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router: api::create_router(state),
            service,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Service handle for request entry points (play, queue, audio delivery)
    pub fn service(&self) -> Arc<PlayerService> {
        Arc::clone(&self.service)
    }

    /// Serve until `shutdown` resolves, then stop the player service
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown_tx = self.shutdown_tx;
        let signal = async move {
            shutdown.await;
            // Ends open SSE streams so the server can drain
            shutdown_tx.send_replace(true);
        };

        let served = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await;
        if let Err(e) = &served {
            error!("HTTP server error: {}", e);
        }

        self.service.stop().await;
        info!("Server shutdown complete");
        Ok(served?)
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
