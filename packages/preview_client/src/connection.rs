use demo_protocol::{ClientMessage, ServerMessage, TextDecoder};
use futures::{SinkExt, StreamExt};
use std::fmt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::bridge::{ClientBridge, PreviewStatus};
use crate::error::ClientError;
use crate::terminal::TerminalSurface;

/// Local events fed into a running preview
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewInput {
    /// Raw keystrokes
    Key(Vec<u8>),
    /// The local viewport changed
    Resize { cols: u16, rows: u16 },
    /// Leave the preview and stop the demo
    Detach,
}

/// Why a preview ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    Exited(Option<i32>),
    StartFailed(String),
    /// Local input ended; the demo was stopped
    Detached,
    Disconnected,
}

impl fmt::Display for PreviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(Some(code)) => write!(f, "exited with code {code}"),
            Self::Exited(None) => write!(f, "terminated"),
            Self::StartFailed(message) => write!(f, "failed to start: {message}"),
            Self::Detached => write!(f, "detached"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

fn frame(msg: &ClientMessage) -> Message {
    Message::Text(msg.encode().into())
}

/// Connect to `url`, start `demo` on `surface` and keep them in sync until
/// the demo ends, the connection drops or input asks to detach (or closes).
pub async fn run_preview<T: TerminalSurface>(
    url: &str,
    demo: &str,
    surface: T,
    mut input: mpsc::Receiver<PreviewInput>,
) -> Result<(PreviewOutcome, T), ClientError> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut ws_write, mut ws_read) = ws_stream.split();
    info!("Connected to {}", url);

    let mut bridge = ClientBridge::new(surface);
    let mut keys = TextDecoder::new();
    bridge.on_open();
    if let Some(start) = bridge.start(demo) {
        ws_write.send(frame(&start)).await?;
    }

    let outcome = loop {
        tokio::select! {
            msg = ws_read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    bridge.handle_frame(text.as_str())?;
                    match bridge.status() {
                        PreviewStatus::Exited { code, .. } => break PreviewOutcome::Exited(*code),
                        PreviewStatus::StartFailed { message, .. } => {
                            break PreviewOutcome::StartFailed(message.clone())
                        }
                        _ => {}
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    bridge.on_close();
                    break PreviewOutcome::Disconnected;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    bridge.on_close();
                    break PreviewOutcome::Disconnected;
                }
            },

            event = input.recv() => match event {
                Some(PreviewInput::Key(bytes)) => {
                    let data = keys.push(&bytes);
                    if let Some(msg) = bridge.key(&data) {
                        if ws_write.send(frame(&msg)).await.is_err() {
                            bridge.on_close();
                            break PreviewOutcome::Disconnected;
                        }
                    }
                }
                Some(PreviewInput::Resize { cols, rows }) => {
                    if let Some(msg) = bridge.resize_request(cols, rows) {
                        let _ = ws_write.send(frame(&msg)).await;
                    }
                }
                Some(PreviewInput::Detach) | None => break PreviewOutcome::Detached,
            },
        }
    };

    let (stop, surface) = bridge.dispose();
    if let Some(stop) = stop {
        debug!("Stopping remote demo");
        let _ = ws_write.send(frame(&stop)).await;
    }
    let _ = ws_write.close().await;

    Ok((outcome, surface))
}

/// Connect just long enough to read the server's demo catalog.
pub async fn fetch_demos(url: &str) -> Result<Vec<String>, ClientError> {
    let (mut ws_stream, _) = tokio_tungstenite::connect_async(url).await?;

    while let Some(msg) = ws_stream.next().await {
        if let Message::Text(text) = msg? {
            if let ServerMessage::Demos { list } = ServerMessage::decode(text.as_str())? {
                let _ = ws_stream.close(None).await;
                return Ok(list);
            }
        }
    }
    Err(ClientError::NoCatalog)
}
