//! Client side of the demo bridge.
//!
//! [`ClientBridge`] is the state machine that keeps a [`TerminalSurface`]
//! byte-exact with the child running on the server: the surface has a fixed
//! size, it is hard-reset on every `started`, and output is only applied
//! while a demo is running. [`run_preview`] drives a bridge over a real
//! WebSocket.
//!
//! ```
//! use demo_protocol::{ClientMessage, ServerMessage};
//! use preview_client::{ClientBridge, PreviewStatus, Vt100Surface};
//!
//! let mut bridge = ClientBridge::new(Vt100Surface::new(40, 10));
//! bridge.handle(ServerMessage::Demos { list: vec!["button".into()] }).unwrap();
//!
//! let start = bridge.start("button").unwrap();
//! assert_eq!(start, ClientMessage::Start { demo: "button".into(), cols: 40, rows: 10 });
//!
//! bridge.handle(ServerMessage::Started { demo: "button".into() }).unwrap();
//! bridge.handle(ServerMessage::Output { data: "[ OK ]".into() }).unwrap();
//! assert_eq!(bridge.surface().contents(), "[ OK ]");
//! assert_eq!(bridge.status(), &PreviewStatus::Running { demo: "button".into() });
//! ```

mod bridge;
mod connection;
mod error;
mod terminal;

pub use bridge::{ClientBridge, PreviewStatus};
pub use connection::{PreviewInput, PreviewOutcome, fetch_demos, run_preview};
pub use error::ClientError;
pub use terminal::{AnsiSurface, TerminalSurface, Vt100Surface};
