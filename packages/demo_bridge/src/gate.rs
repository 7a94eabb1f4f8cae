use demo_protocol::{ServerMessage, TextDecoder};
use tracing::debug;

use crate::session::{BridgeEvent, SessionId};

/// Last filter before the socket: only the live session's frames get out.
///
/// `Started` makes its session live. Output or exit of any other session is
/// dropped, so a replaced child can never paint over its successor, even if
/// its events were already queued when it was retired. The text decoder is
/// reset on every switch of the live session.
pub struct OutputGate {
    live: Option<SessionId>,
    decoder: TextDecoder,
}

impl Default for OutputGate {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputGate {
    pub fn new() -> Self {
        Self {
            live: None,
            decoder: TextDecoder::new(),
        }
    }

    pub fn live(&self) -> Option<SessionId> {
        self.live
    }

    /// Turn an event into the frame to send, or `None` to drop it.
    pub fn admit(&mut self, event: BridgeEvent) -> Option<ServerMessage> {
        match event {
            BridgeEvent::Demos(list) => Some(ServerMessage::Demos { list }),
            BridgeEvent::Started { session, demo } => {
                self.live = Some(session);
                self.decoder.reset();
                Some(ServerMessage::Started { demo })
            }
            BridgeEvent::Output { session, data } => {
                if self.live != Some(session) {
                    debug!(%session, "Dropping {} bytes from a retired session", data.len());
                    return None;
                }
                let text = self.decoder.push(&data);
                if text.is_empty() {
                    return None;
                }
                Some(ServerMessage::Output { data: text })
            }
            BridgeEvent::Exited { session, status } => {
                if self.live != Some(session) {
                    debug!(%session, "Dropping exit of a retired session");
                    return None;
                }
                self.live = None;
                self.decoder.reset();
                Some(ServerMessage::Exit { code: status.code })
            }
            BridgeEvent::Error(err) => Some(err.to_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use demo_launcher::{ExitStatus, LaunchError};

    fn output(session: u64, data: &[u8]) -> BridgeEvent {
        BridgeEvent::Output {
            session: SessionId(session),
            data: data.to_vec(),
        }
    }

    fn started(session: u64, demo: &str) -> BridgeEvent {
        BridgeEvent::Started {
            session: SessionId(session),
            demo: demo.to_string(),
        }
    }

    #[test]
    fn test_output_before_start_is_dropped() {
        let mut gate = OutputGate::new();
        assert_eq!(gate.admit(output(1, b"early")), None);
        assert_eq!(gate.live(), None);
    }

    #[test]
    fn test_live_session_flows() {
        let mut gate = OutputGate::new();
        assert_eq!(
            gate.admit(started(1, "button")),
            Some(ServerMessage::Started {
                demo: "button".into()
            })
        );
        assert_eq!(
            gate.admit(output(1, b"hi")),
            Some(ServerMessage::Output { data: "hi".into() })
        );
        assert_eq!(
            gate.admit(BridgeEvent::Exited {
                session: SessionId(1),
                status: ExitStatus {
                    code: Some(3),
                    signal: None
                },
            }),
            Some(ServerMessage::Exit { code: Some(3) })
        );
        assert_eq!(gate.live(), None);
        assert_eq!(gate.admit(output(1, b"late")), None);
    }

    #[test]
    fn test_replaced_session_is_silenced() {
        let mut gate = OutputGate::new();
        gate.admit(started(1, "a"));
        gate.admit(started(2, "b"));

        assert_eq!(gate.admit(output(1, b"stale")), None);
        assert_eq!(
            gate.admit(BridgeEvent::Exited {
                session: SessionId(1),
                status: ExitStatus::unknown(),
            }),
            None
        );
        assert_eq!(gate.live(), Some(SessionId(2)));
        assert_eq!(
            gate.admit(output(2, b"fresh")),
            Some(ServerMessage::Output {
                data: "fresh".into()
            })
        );
    }

    #[test]
    fn test_partial_character_does_not_leak_into_next_session() {
        let mut gate = OutputGate::new();
        gate.admit(started(1, "a"));
        assert_eq!(gate.admit(output(1, &[0xC3])), None);
        gate.admit(started(2, "b"));
        assert_eq!(
            gate.admit(output(2, b"x")),
            Some(ServerMessage::Output { data: "x".into() })
        );
    }

    #[test]
    fn test_signal_exit_has_null_code() {
        let mut gate = OutputGate::new();
        gate.admit(started(4, "a"));
        let frame = gate
            .admit(BridgeEvent::Exited {
                session: SessionId(4),
                status: ExitStatus {
                    code: None,
                    signal: Some(15),
                },
            })
            .unwrap();
        assert_eq!(frame.encode(), r#"{"type":"exit","code":null}"#);
    }

    #[test]
    fn test_errors_and_demos_always_pass() {
        let mut gate = OutputGate::new();
        assert_eq!(
            gate.admit(BridgeEvent::Demos(vec!["a".into()])),
            Some(ServerMessage::Demos {
                list: vec!["a".into()]
            })
        );
        let frame = gate
            .admit(BridgeEvent::Error(BridgeError::from(
                LaunchError::UnknownDemo("zzz".into()),
            )))
            .unwrap();
        assert_eq!(
            frame,
            ServerMessage::error("unknown demo: zzz", Some("unknown_demo"))
        );
    }
}
