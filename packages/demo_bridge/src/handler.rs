//! Per-connection WebSocket loop.
//!
//! The reader half decodes control messages and drives the connection's
//! [`SessionManager`]. A separate writer task drains the event queue through
//! the [`OutputGate`] onto the socket, so a slow browser never blocks the
//! control path.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use demo_protocol::ClientMessage;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::BridgeError;
use crate::gate::OutputGate;
use crate::session::{BridgeEvent, SessionManager};

pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| {
        let connections = state.connections.clone();
        connections.track_future(handle_connection(socket, state))
    })
}

/// Where a connection is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected, no session
    Idle,
    /// A session exists (it may already have exited)
    Active,
    /// Socket gone; nothing is accepted
    Closed,
}

/// What to do with one decoded message in a given state
#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    Start { demo: String, cols: i64, rows: i64 },
    Input(String),
    Resize { cols: i64, rows: i64 },
    Stop,
    Ignore(&'static str),
}

impl ConnectionState {
    pub fn route(self, msg: ClientMessage) -> Route {
        match (self, msg) {
            (Self::Closed, _) => Route::Ignore("connection closed"),
            (_, ClientMessage::Start { demo, cols, rows }) => Route::Start { demo, cols, rows },
            (Self::Idle, ClientMessage::Input { .. }) => Route::Ignore("input without a session"),
            (Self::Idle, ClientMessage::Resize { .. }) => Route::Ignore("resize without a session"),
            (Self::Idle, ClientMessage::Stop) => Route::Ignore("stop without a session"),
            (Self::Active, ClientMessage::Input { data }) => Route::Input(data),
            (Self::Active, ClientMessage::Resize { cols, rows }) => Route::Resize { cols, rows },
            (Self::Active, ClientMessage::Stop) => Route::Stop,
        }
    }

    /// State after a message has been handled
    pub fn settle(self, has_session: bool) -> Self {
        match self {
            Self::Closed => Self::Closed,
            _ if has_session => Self::Active,
            _ => Self::Idle,
        }
    }
}

/// Run one preview connection to completion. The child, if any, is dead by
/// the time this returns.
pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let span = tracing::info_span!("connection", id = %connection_id);
    run_connection(socket, state).instrument(span).await
}

async fn run_connection(socket: WebSocket, state: AppState) {
    info!("Preview connection opened");
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<BridgeEvent>(state.settings.outbound_capacity.max(1));
    let manager = SessionManager::new(state.launcher.clone(), tx.clone(), state.settings.clone());

    let _ = tx.send(BridgeEvent::Demos(state.launcher.demos())).await;

    let mut sender_task = tokio::spawn(
        async move {
            let mut gate = OutputGate::new();
            while let Some(event) = rx.recv().await {
                let Some(msg) = gate.admit(event) else {
                    continue;
                };
                if ws_sender.send(Message::Text(msg.encode().into())).await.is_err() {
                    debug!("Socket write failed, stopping writer");
                    break;
                }
            }
        }
        .in_current_span(),
    );

    let receive_loop = async {
        let mut connection = ConnectionState::Idle;
        while let Some(frame) = ws_receiver.next().await {
            let decoded = match frame {
                Ok(Message::Text(text)) => ClientMessage::decode(text.as_str()),
                Ok(Message::Binary(bytes)) => ClientMessage::decode_bytes(&bytes),
                Ok(Message::Close(_)) => {
                    debug!("Client sent close");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
            };

            match decoded {
                Ok(msg) => {
                    debug!("Received '{}' in state {:?}", msg.kind(), connection);
                    connection = dispatch(connection, msg, &manager, &tx).await;
                }
                Err(e) => {
                    warn!("Rejected client frame: {}", e);
                    let _ = tx.send(BridgeEvent::Error(BridgeError::from(e))).await;
                }
            }
        }
        connection
    };

    tokio::select! {
        last = receive_loop => debug!("Reader finished in state {:?}", last),
        _ = &mut sender_task => debug!("Writer finished first"),
        _ = state.shutdown.cancelled() => info!("Server shutting down"),
    }

    manager.teardown().await;
    drop(tx);
    sender_task.abort();
    info!("Preview connection closed");
}

async fn dispatch(
    state: ConnectionState,
    msg: ClientMessage,
    manager: &SessionManager,
    tx: &mpsc::Sender<BridgeEvent>,
) -> ConnectionState {
    let result = match state.route(msg) {
        Route::Start { demo, cols, rows } => {
            manager.start_demo(&demo, cols, rows).await.map(|info| {
                debug!("Session {} is live (pid {:?})", info.id, info.pid);
            })
        }
        Route::Input(data) => {
            manager.forward_input(data.as_bytes()).await;
            Ok(())
        }
        Route::Resize { cols, rows } => manager.forward_resize(cols, rows).await.map(|_| ()),
        Route::Stop => {
            manager.stop().await;
            Ok(())
        }
        Route::Ignore(reason) => {
            debug!("Ignoring message: {}", reason);
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!("Request failed: {}", e);
        let _ = tx.send(BridgeEvent::Error(e)).await;
    }

    state.settle(manager.has_session().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> ClientMessage {
        ClientMessage::Start {
            demo: "button".into(),
            cols: 40,
            rows: 20,
        }
    }

    #[test]
    fn test_idle_routes() {
        let idle = ConnectionState::Idle;
        assert_eq!(
            idle.route(start()),
            Route::Start {
                demo: "button".into(),
                cols: 40,
                rows: 20
            }
        );
        assert!(matches!(
            idle.route(ClientMessage::Input { data: "x".into() }),
            Route::Ignore(_)
        ));
        assert!(matches!(
            idle.route(ClientMessage::Resize { cols: 1, rows: 1 }),
            Route::Ignore(_)
        ));
        assert!(matches!(idle.route(ClientMessage::Stop), Route::Ignore(_)));
    }

    #[test]
    fn test_active_routes() {
        let active = ConnectionState::Active;
        assert!(matches!(active.route(start()), Route::Start { .. }));
        assert_eq!(
            active.route(ClientMessage::Input { data: "q".into() }),
            Route::Input("q".into())
        );
        assert_eq!(
            active.route(ClientMessage::Resize { cols: 90, rows: 30 }),
            Route::Resize { cols: 90, rows: 30 }
        );
        assert_eq!(active.route(ClientMessage::Stop), Route::Stop);
    }

    #[test]
    fn test_closed_accepts_nothing() {
        let closed = ConnectionState::Closed;
        assert!(matches!(closed.route(start()), Route::Ignore(_)));
        assert!(matches!(closed.route(ClientMessage::Stop), Route::Ignore(_)));
    }

    #[test]
    fn test_settle() {
        assert_eq!(ConnectionState::Idle.settle(true), ConnectionState::Active);
        assert_eq!(ConnectionState::Active.settle(false), ConnectionState::Idle);
        assert_eq!(ConnectionState::Active.settle(true), ConnectionState::Active);
        assert_eq!(ConnectionState::Closed.settle(true), ConnectionState::Closed);
    }
}
