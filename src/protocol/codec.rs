//! Wire codec for device frames.
//!
//! Heartbeat sentinels are bare text frames and are recognised before any JSON parsing.
//! Everything else is a JSON object `{"m": <code>, "p": {<scalars>}}`.

use serde::{Deserialize, Serialize};

use super::messages::{InboundMessage, OutboundMessage, Payload, ServerMessageType};
use crate::core::{LinkError, LinkResult, PING_SENTINEL, PONG_SENTINEL, WsFrame};

/// Reserved non-JSON frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    Ping,
    Pong,
}

impl Sentinel {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes == PING_SENTINEL.as_bytes() {
            Some(Sentinel::Ping)
        } else if bytes == PONG_SENTINEL.as_bytes() {
            Some(Sentinel::Pong)
        } else {
            None
        }
    }
}

/// Outcome of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    Sentinel(Sentinel),
    Message(InboundMessage),
    /// Protocol-level control frame handled by the transport.
    Control,
}

#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    m: &'static str,
    p: &'a Payload,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InboundEnvelope {
    m: String,
    #[serde(default)]
    p: Option<Payload>,
}

/// Serialize `message` into a text frame, rejecting it if the frame is larger than `max_bytes`.
pub fn encode_message(message: &OutboundMessage, max_bytes: usize) -> LinkResult<WsFrame> {
    let json = sonic_rs::to_string(&OutboundEnvelope {
        m: message.kind.code(),
        p: &message.payload,
    })
    .map_err(|err| LinkError::Encode(err.to_string()))?;

    if json.len() > max_bytes {
        return Err(LinkError::FrameTooLarge {
            size: json.len(),
            max: max_bytes,
        });
    }
    Ok(WsFrame::text(json))
}

/// Decode an inbound frame, checking for sentinels before attempting JSON.
pub fn decode_frame(frame: &WsFrame, max_bytes: usize) -> LinkResult<DecodedFrame> {
    let bytes = match frame {
        WsFrame::Text(bytes) => bytes,
        WsFrame::Binary(_) => {
            return Err(LinkError::MalformedFrame(
                "binary frames are not part of the protocol".to_string(),
            ));
        }
        WsFrame::Ping(_) | WsFrame::Pong(_) | WsFrame::Close(_) => {
            return Ok(DecodedFrame::Control);
        }
    };

    if let Some(sentinel) = Sentinel::parse(bytes) {
        return Ok(DecodedFrame::Sentinel(sentinel));
    }

    if bytes.len() > max_bytes {
        return Err(LinkError::MalformedFrame(format!(
            "frame of {} bytes exceeds the {max_bytes} byte limit",
            bytes.len()
        )));
    }

    let envelope: InboundEnvelope = sonic_rs::from_slice(bytes)
        .map_err(|err| LinkError::MalformedFrame(err.to_string()))?;
    let kind = ServerMessageType::from_code(&envelope.m)
        .ok_or(LinkError::UnknownMessageType(envelope.m))?;

    Ok(DecodedFrame::Message(InboundMessage {
        kind,
        payload: envelope.p.unwrap_or_default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MAX_INBOUND_FRAME_BYTES;
    use crate::protocol::messages::{Scalar, VirtualButton};

    fn decode(text: &str) -> LinkResult<DecodedFrame> {
        decode_frame(&WsFrame::text(text.to_string()), MAX_INBOUND_FRAME_BYTES)
    }

    #[test]
    fn sentinels_bypass_json() {
        assert_eq!(decode("PONG"), Ok(DecodedFrame::Sentinel(Sentinel::Pong)));
        assert_eq!(decode("PING"), Ok(DecodedFrame::Sentinel(Sentinel::Ping)));
    }

    #[test]
    fn decodes_status_change() {
        let decoded = decode(r#"{"m":"SC","p":{"door_state":"OPEN","mqtt_state":"CONNECTED","mqtt_error":null}}"#)
            .unwrap();
        let DecodedFrame::Message(message) = decoded else {
            panic!("expected message");
        };
        assert_eq!(message.kind, ServerMessageType::StatusChange);
        assert_eq!(message.get("door_state"), Some(&Scalar::Text("OPEN".into())));
        assert_eq!(message.get("mqtt_error"), Some(&Scalar::Null));
    }

    #[test]
    fn missing_or_null_payload_defaults_to_empty() {
        for text in [r#"{"m":"RB"}"#, r#"{"m":"RB","p":null}"#] {
            let DecodedFrame::Message(message) = decode(text).unwrap() else {
                panic!("expected message");
            };
            assert_eq!(message.kind, ServerMessageType::Rebooting);
            assert!(message.payload.is_empty());
        }
    }

    #[test]
    fn rejects_garbage_and_foreign_shapes() {
        assert!(matches!(decode("hello"), Err(LinkError::MalformedFrame(_))));
        assert!(matches!(decode("[1,2,3]"), Err(LinkError::MalformedFrame(_))));
        assert!(matches!(
            decode(r#"{"m":"SC","p":{},"x":1}"#),
            Err(LinkError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode(r#"{"m":"SC","p":{"nested":{"a":1}}}"#),
            Err(LinkError::MalformedFrame(_))
        ));
        assert_eq!(
            decode(r#"{"m":"ZZ","p":{}}"#),
            Err(LinkError::UnknownMessageType("ZZ".into()))
        );
    }

    #[test]
    fn rejects_binary_and_oversize_frames() {
        let binary = WsFrame::Binary(bytes::Bytes::from_static(b"{}"));
        assert!(decode_frame(&binary, 1024).is_err());

        let big = format!(r#"{{"m":"SD","p":{{"pad":"{}"}}}}"#, "x".repeat(64));
        assert!(matches!(
            decode_frame(&WsFrame::text(big), 32),
            Err(LinkError::MalformedFrame(_))
        ));
    }

    #[test]
    fn control_frames_are_left_to_the_transport() {
        assert_eq!(
            decode_frame(&WsFrame::Ping(bytes::Bytes::new()), 16),
            Ok(DecodedFrame::Control)
        );
    }

    #[test]
    fn encodes_compact_envelope() {
        let frame = encode_message(&OutboundMessage::button_press(VirtualButton::Activate), 255)
            .unwrap();
        assert_eq!(frame.as_text(), Some(r#"{"m":"BP","p":{"b":"ACTIVATE"}}"#));
    }

    #[test]
    fn oversize_outbound_is_rejected() {
        let message = OutboundMessage::reboot().with("pad", "x".repeat(300));
        match encode_message(&message, 255) {
            Err(LinkError::FrameTooLarge { size, max }) => {
                assert!(size > 255);
                assert_eq!(max, 255);
            }
            other => panic!("expected FrameTooLarge, got {other:?}"),
        }
    }
}
