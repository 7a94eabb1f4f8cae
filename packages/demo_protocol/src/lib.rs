//! Control protocol for the demo bridge.
//!
//! Every frame is a JSON object tagged by `type`. Clients send `start`,
//! `input`, `resize` and `stop`; the server answers with `demos`, `started`,
//! `output`, `exit` and `error`.
//!
//! ```
//! use demo_protocol::{ClientMessage, ServerMessage};
//!
//! let msg = ClientMessage::decode(r#"{"type":"start","demo":"button","cols":40,"rows":20}"#).unwrap();
//! assert!(matches!(msg, ClientMessage::Start { ref demo, cols: 40, rows: 20 } if demo == "button"));
//!
//! let frame = ServerMessage::Started { demo: "button".into() }.encode();
//! assert_eq!(frame, r#"{"type":"started","demo":"button"}"#);
//! ```

mod error;
mod messages;
mod text;

pub use error::ProtocolError;
pub use messages::{ClientMessage, ServerMessage};
pub use text::TextDecoder;
