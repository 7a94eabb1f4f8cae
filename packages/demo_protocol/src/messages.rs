use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Messages sent FROM the client TO the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Spawn (or replace) the connection's demo at a fixed size.
    ///
    /// Dimensions are signed so that zero and negative values survive
    /// decoding and get rejected by size validation instead.
    Start { demo: String, cols: i64, rows: i64 },
    /// Raw keystrokes for the child's stdin
    Input { data: String },
    /// Best-effort resize notification
    Resize { cols: i64, rows: i64 },
    /// Terminate the active demo
    Stop,
}

/// Messages sent FROM the server TO the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Sent once on connect
    Demos { list: Vec<String> },
    /// A new child is running; the client must hard-reset its terminal
    Started { demo: String },
    /// Child stdout/stderr, to be written verbatim
    Output { data: String },
    /// Child terminated; `null` when it was killed by a signal
    Exit { code: Option<i32> },
    /// Recoverable protocol or spawn error
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

const CLIENT_TYPES: &[&str] = &["start", "input", "resize", "stop"];
const SERVER_TYPES: &[&str] = &["demos", "started", "output", "exit", "error"];

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, CLIENT_TYPES)
    }

    /// Decode a binary frame carrying UTF-8 JSON.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
        Self::decode(text)
    }

    pub fn encode(&self) -> String {
        encode_frame(self)
    }

    /// Wire name of this message's `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Input { .. } => "input",
            Self::Resize { .. } => "resize",
            Self::Stop => "stop",
        }
    }
}

impl ServerMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, SERVER_TYPES)
    }

    pub fn encode(&self) -> String {
        encode_frame(self)
    }

    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            code: code.map(str::to_string),
        }
    }
}

fn decode_tagged<T: DeserializeOwned>(text: &str, known: &[&str]) -> Result<T, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(ProtocolError::MissingType),
    };

    if !known.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidMessage {
        kind,
        reason: e.to_string(),
    })
}

fn encode_frame<T: Serialize>(message: &T) -> String {
    // These enums only hold strings and integers, so this cannot fail in
    // practice; an error frame is still better than a panic.
    serde_json::to_string(message).unwrap_or_else(|e| {
        serde_json::json!({
            "type": "error",
            "message": format!("failed to encode message: {e}"),
        })
        .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_start() {
        let msg = ClientMessage::decode(r#"{"type":"start","demo":"button","cols":40,"rows":20}"#)
            .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Start {
                demo: "button".to_string(),
                cols: 40,
                rows: 20,
            }
        );
    }

    #[test]
    fn test_decode_start_keeps_non_positive_dimensions() {
        let msg =
            ClientMessage::decode(r#"{"type":"start","demo":"x","cols":0,"rows":-3}"#).unwrap();
        match msg {
            ClientMessage::Start { cols, rows, .. } => {
                assert_eq!(cols, 0);
                assert_eq!(rows, -3);
            }
            _ => panic!("Expected Start message"),
        }
    }

    #[test]
    fn test_decode_input_and_resize() {
        let input = ClientMessage::decode(r#"{"type":"input","data":"\u001b[A"}"#).unwrap();
        assert_eq!(
            input,
            ClientMessage::Input {
                data: "\x1b[A".to_string()
            }
        );

        let resize = ClientMessage::decode(r#"{"type":"resize","cols":100,"rows":30}"#).unwrap();
        assert_eq!(resize, ClientMessage::Resize { cols: 100, rows: 30 });
    }

    #[test]
    fn test_decode_stop_ignores_extra_fields() {
        assert_eq!(
            ClientMessage::decode(r#"{"type":"stop"}"#).unwrap(),
            ClientMessage::Stop
        );
        assert_eq!(
            ClientMessage::decode(r#"{"type":"stop","reason":"unmount"}"#).unwrap(),
            ClientMessage::Stop
        );
    }

    #[test]
    fn test_decode_binary_frame() {
        let msg = ClientMessage::decode_bytes(br#"{"type":"input","data":"q"}"#).unwrap();
        assert_eq!(msg.kind(), "input");

        let err = ClientMessage::decode_bytes(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(err, ProtocolError::NotUtf8);
    }

    #[test]
    fn test_malformed_json() {
        let err = ClientMessage::decode("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
    }

    #[test]
    fn test_missing_type() {
        assert_eq!(
            ClientMessage::decode(r#"{"demo":"button"}"#).unwrap_err(),
            ProtocolError::MissingType
        );
        assert_eq!(
            ClientMessage::decode(r#"{"type":7}"#).unwrap_err(),
            ProtocolError::MissingType
        );
        assert_eq!(
            ClientMessage::decode("[1,2,3]").unwrap_err(),
            ProtocolError::MissingType
        );
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            ClientMessage::decode(r#"{"type":"explode"}"#).unwrap_err(),
            ProtocolError::UnknownType("explode".to_string())
        );
        // Server-only types are unknown in the client direction
        assert_eq!(
            ClientMessage::decode(r#"{"type":"output","data":"x"}"#).unwrap_err(),
            ProtocolError::UnknownType("output".to_string())
        );
    }

    #[test]
    fn test_missing_fields_are_invalid_message() {
        let err = ClientMessage::decode(r#"{"type":"start","demo":"button"}"#).unwrap_err();
        match err {
            ProtocolError::InvalidMessage { kind, reason } => {
                assert_eq!(kind, "start");
                assert!(reason.contains("cols"), "reason was: {reason}");
            }
            other => panic!("Expected InvalidMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_server_messages() {
        assert_eq!(
            ServerMessage::Demos {
                list: vec!["button".into(), "table".into()]
            }
            .encode(),
            r#"{"type":"demos","list":["button","table"]}"#
        );
        assert_eq!(
            ServerMessage::Output {
                data: "\x1b[1mhi".into()
            }
            .encode(),
            r#"{"type":"output","data":"\u001b[1mhi"}"#
        );
        assert_eq!(
            ServerMessage::Exit { code: None }.encode(),
            r#"{"type":"exit","code":null}"#
        );
        assert_eq!(
            ServerMessage::Exit { code: Some(2) }.encode(),
            r#"{"type":"exit","code":2}"#
        );
        assert_eq!(
            ServerMessage::error("boom", None).encode(),
            r#"{"type":"error","message":"boom"}"#
        );
        assert_eq!(
            ServerMessage::error("no such demo", Some("unknown_demo")).encode(),
            r#"{"type":"error","message":"no such demo","code":"unknown_demo"}"#
        );
    }

    #[test]
    fn test_server_decode_matches_encode() {
        let frame = r#"{"type":"exit","code":null}"#;
        assert_eq!(
            ServerMessage::decode(frame).unwrap(),
            ServerMessage::Exit { code: None }
        );
        assert_eq!(
            ServerMessage::decode(r#"{"type":"start","demo":"a","cols":1,"rows":1}"#)
                .unwrap_err(),
            ProtocolError::UnknownType("start".to_string())
        );
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(text in ".*") {
            let _ = ClientMessage::decode(&text);
        }

        #[test]
        fn prop_unknown_types_are_reported(kind in "[a-z]{1,12}") {
            prop_assume!(!CLIENT_TYPES.contains(&kind.as_str()));
            let frame = serde_json::json!({ "type": kind }).to_string();
            prop_assert_eq!(
                ClientMessage::decode(&frame).unwrap_err(),
                ProtocolError::UnknownType(kind)
            );
        }

        #[test]
        fn prop_input_data_is_preserved(data in any::<String>()) {
            let frame = ClientMessage::Input { data: data.clone() }.encode();
            prop_assert_eq!(ClientMessage::decode(&frame).unwrap(), ClientMessage::Input { data });
        }
    }
}
