use demo_protocol::{ClientMessage, ServerMessage};
use std::fmt;
use std::io;
use tracing::debug;

use crate::error::ClientError;
use crate::terminal::TerminalSurface;

/// What the user should see about the preview
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreviewStatus {
    Connecting,
    /// Connected, nothing started yet
    Ready,
    Starting { demo: String },
    Running { demo: String },
    StartFailed { demo: String, message: String },
    /// The demo ended on its own or was stopped
    Exited { demo: String, code: Option<i32> },
    /// Socket closed; the bridge does not reconnect
    Disconnected,
}

impl fmt::Display for PreviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
            Self::Starting { demo } => write!(f, "starting {demo}"),
            Self::Running { demo } => write!(f, "running {demo}"),
            Self::StartFailed { demo, message } => write!(f, "failed to start {demo}: {message}"),
            Self::Exited { demo, code: Some(code) } => write!(f, "{demo} exited with code {code}"),
            Self::Exited { demo, code: None } => write!(f, "{demo} was terminated"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Keeps one terminal surface byte-exact with the server's child.
///
/// The bridge never talks to the socket itself: methods return the message
/// to send, and incoming frames are fed through [`ClientBridge::handle`].
pub struct ClientBridge<T: TerminalSurface> {
    surface: T,
    status: PreviewStatus,
    demos: Vec<String>,
    last_error: Option<String>,
}

impl<T: TerminalSurface> ClientBridge<T> {
    pub fn new(surface: T) -> Self {
        Self {
            surface,
            status: PreviewStatus::Connecting,
            demos: Vec::new(),
            last_error: None,
        }
    }

    pub fn status(&self) -> &PreviewStatus {
        &self.status
    }

    /// Catalog received on connect
    pub fn demos(&self) -> &[String] {
        &self.demos
    }

    /// Latest error that did not belong to a start request
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn surface(&self) -> &T {
        &self.surface
    }

    pub fn is_connected(&self) -> bool {
        !matches!(
            self.status,
            PreviewStatus::Connecting | PreviewStatus::Disconnected
        )
    }

    fn has_active_demo(&self) -> bool {
        matches!(
            self.status,
            PreviewStatus::Starting { .. } | PreviewStatus::Running { .. }
        )
    }

    /// The socket is open.
    pub fn on_open(&mut self) {
        if self.status == PreviewStatus::Connecting {
            self.status = PreviewStatus::Ready;
        }
    }

    pub fn on_close(&mut self) {
        debug!("Preview disconnected while {}", self.status);
        self.status = PreviewStatus::Disconnected;
    }

    /// Request `demo` at the surface's own size.
    pub fn start(&mut self, demo: &str) -> Option<ClientMessage> {
        if !self.is_connected() {
            return None;
        }
        let (cols, rows) = self.surface.size();
        self.status = PreviewStatus::Starting {
            demo: demo.to_string(),
        };
        Some(ClientMessage::Start {
            demo: demo.to_string(),
            cols: i64::from(cols),
            rows: i64::from(rows),
        })
    }

    pub fn key(&self, data: &str) -> Option<ClientMessage> {
        if !self.is_connected() || data.is_empty() {
            return None;
        }
        Some(ClientMessage::Input {
            data: data.to_string(),
        })
    }

    /// Tell the server about a new viewport. The surface keeps its size.
    pub fn resize_request(&self, cols: u16, rows: u16) -> Option<ClientMessage> {
        if !self.is_connected() {
            return None;
        }
        Some(ClientMessage::Resize {
            cols: i64::from(cols),
            rows: i64::from(rows),
        })
    }

    pub fn stop(&mut self) -> Option<ClientMessage> {
        if !self.is_connected() || !self.has_active_demo() {
            return None;
        }
        Some(ClientMessage::Stop)
    }

    /// Decode and apply one text frame. Frames that do not decode are
    /// logged and skipped.
    pub fn handle_frame(&mut self, text: &str) -> Result<(), ClientError> {
        match ServerMessage::decode(text) {
            Ok(msg) => Ok(self.handle(msg)?),
            Err(e) => {
                debug!("Ignoring undecodable server frame: {}", e);
                self.last_error = Some(e.to_string());
                Ok(())
            }
        }
    }

    pub fn handle(&mut self, msg: ServerMessage) -> io::Result<()> {
        match msg {
            ServerMessage::Demos { list } => {
                self.demos = list;
                self.on_open();
            }
            ServerMessage::Started { demo } => {
                // Whatever the previous child left behind must go
                self.surface.reset()?;
                self.last_error = None;
                self.status = PreviewStatus::Running { demo };
            }
            ServerMessage::Output { data } => {
                if matches!(self.status, PreviewStatus::Running { .. }) {
                    self.surface.write(&data)?;
                }
            }
            ServerMessage::Exit { code } => {
                if let PreviewStatus::Running { demo } = &self.status {
                    self.status = PreviewStatus::Exited {
                        demo: demo.clone(),
                        code,
                    };
                }
            }
            ServerMessage::Error { message, .. } => match &self.status {
                PreviewStatus::Starting { demo } => {
                    self.status = PreviewStatus::StartFailed {
                        demo: demo.clone(),
                        message,
                    };
                }
                _ => self.last_error = Some(message),
            },
        }
        Ok(())
    }

    /// Tear down: the `stop` to send if a demo is still active, and the
    /// surface back.
    pub fn dispose(mut self) -> (Option<ClientMessage>, T) {
        let stop = self.stop();
        (stop, self.surface)
    }
}
