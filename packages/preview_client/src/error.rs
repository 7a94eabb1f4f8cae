use demo_protocol::ProtocolError;
use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("terminal write failed: {0}")]
    Terminal(#[from] std::io::Error),

    #[error("invalid server frame: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server closed before sending its demo catalog
    #[error("connection closed before the demo list arrived")]
    NoCatalog,
}
