//! WebSocket bridge that gives every browser connection its own live demo
//! program.
//!
//! Each connection owns at most one child process. The child runs at exactly
//! the size the client asked for, its output is streamed back verbatim, and
//! it is killed when the client stops it, starts another demo or goes away.

pub mod config;
pub mod error;
pub mod gate;
pub mod handler;
pub mod session;
pub mod web;

use axum::{Router, routing::get};
use demo_launcher::{Launcher, NativeLauncher};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::{BridgeConfig, FileConfig, load_config};
pub use error::BridgeError;
pub use gate::OutputGate;
pub use handler::{ConnectionState, Route};
pub use session::{
    BridgeEvent, SessionId, SessionInfo, SessionManager, SessionSettings, SessionStatus,
};

/// Shared by every connection
#[derive(Clone)]
pub struct AppState {
    pub launcher: Arc<dyn Launcher>,
    pub settings: SessionSettings,
    /// Cancelled when the server shuts down; live connections tear down
    pub shutdown: CancellationToken,
    /// Connection tasks, so shutdown can wait for their children to die
    pub connections: TaskTracker,
}

impl AppState {
    pub fn new(launcher: Arc<dyn Launcher>, settings: SessionSettings) -> Self {
        Self {
            launcher,
            settings,
            shutdown: CancellationToken::new(),
            connections: TaskTracker::new(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        let launcher = NativeLauncher::new(
            Arc::new(config.registry.clone()),
            config.launch.clone(),
        );
        Self::new(Arc::new(launcher), config.session.clone())
    }

    /// Tear down every connection and wait for them to finish.
    pub async fn close_connections(&self) {
        self.shutdown.cancel();
        self.connections.close();
        self.connections.wait().await;
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(web::index_page))
        .route("/health", get(web::health))
        .route("/api/demos", get(web::list_demos))
        .route("/ws", get(handler::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
