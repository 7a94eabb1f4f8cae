use demo_launcher::LaunchError;
use demo_protocol::{ProtocolError, ServerMessage};

/// Errors surfaced to a preview connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("invalid message: {0}")]
    Protocol(#[from] ProtocolError),

    /// The connection is shutting down and accepts no new sessions
    #[error("connection is closed")]
    ConnectionClosed,
}

impl BridgeError {
    /// Stable machine-readable code sent alongside the message
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Launch(LaunchError::UnknownDemo(_)) => "unknown_demo",
            Self::Launch(LaunchError::InvalidDimensions { .. }) => "invalid_dimensions",
            Self::Launch(LaunchError::SpawnFailed { .. }) => "spawn_failed",
            Self::Launch(_) => "process_error",
            Self::Protocol(_) => "protocol_error",
            Self::ConnectionClosed => "connection_closed",
        }
    }

    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.to_string(), Some(self.error_code()))
    }
}
