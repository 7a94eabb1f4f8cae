/// Errors that can occur while launching or driving a demo process
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    /// Name is not in the demo registry
    #[error("unknown demo: {0}")]
    UnknownDemo(String),

    /// Columns and rows must both be in 1..=65535
    #[error("invalid dimensions {cols}x{rows}: columns and rows must be between 1 and 65535")]
    InvalidDimensions { cols: i64, rows: i64 },

    /// The OS refused to start the program (missing binary, permissions, ...)
    #[error("failed to spawn demo '{demo}': {reason}")]
    SpawnFailed { demo: String, reason: String },

    /// The child closed its stdin or has already exited
    #[error("process input is closed")]
    InputClosed,

    /// The child is not draining its stdin fast enough
    #[error("process is not reading its input")]
    InputFull,

    #[error("failed to resize terminal: {0}")]
    ResizeFailed(String),
}

impl LaunchError {
    pub(crate) fn spawn_failed(demo: &str, reason: impl ToString) -> Self {
        Self::SpawnFailed {
            demo: demo.to_string(),
            reason: reason.to_string(),
        }
    }
}
