/// Reasons a frame could not be turned into a control message.
///
/// All of these are recoverable: the server reports them with an `error`
/// frame and keeps the connection open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not valid UTF-8")]
    NotUtf8,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("message has no `type` field")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("invalid `{kind}` message: {reason}")]
    InvalidMessage { kind: String, reason: String },
}
