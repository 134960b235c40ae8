//! Control messages: handshake negotiation and heartbeats.
//!
//! These ride the normal packet framing but use reserved message ids below
//! [`CONTROL_ID_MAX`]. They are produced and consumed entirely inside the
//! connection layer; application handlers never see them.
//!
//! Decoding here faces remote input, so every read is bounds-checked against
//! [`Packet::remaining`] and malformed payloads report
//! [`GateError::MalformedBody`] instead of tripping the packet cursor.

use crate::core::packet::Packet;
use crate::error::{GateError, Result};

/// Message ids below this threshold are internal control messages.
pub const CONTROL_ID_MAX: u16 = 16;

/// Client -> server: opens the handshake, carries the shared key.
pub const MSG_HANDSHAKE_REQ: u16 = 1;
/// Server -> client: handshake verdict plus negotiated heartbeat interval.
pub const MSG_HANDSHAKE_RSP: u16 = 2;
/// Client -> server: acknowledges the verdict; application traffic may flow.
pub const MSG_HANDSHAKE_ACK: u16 = 3;
/// Either direction: liveness signal, empty body.
pub const MSG_HEARTBEAT: u16 = 4;

/// Handshake accepted.
pub const HANDSHAKE_OK: u8 = 0;
/// Handshake rejected: key mismatch.
pub const HANDSHAKE_ERR_KEY: u8 = 1;

/// Whether a message id belongs to the internal control range.
pub fn is_control(id: u16) -> bool {
    id < CONTROL_ID_MAX
}

/// Decoded internal control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    HandshakeRequest { key: String },
    HandshakeResponse { code: u8, heartbeat_ms: u32 },
    HandshakeAck,
    Heartbeat,
}

impl ControlMessage {
    pub fn message_id(&self) -> u16 {
        match self {
            ControlMessage::HandshakeRequest { .. } => MSG_HANDSHAKE_REQ,
            ControlMessage::HandshakeResponse { .. } => MSG_HANDSHAKE_RSP,
            ControlMessage::HandshakeAck => MSG_HANDSHAKE_ACK,
            ControlMessage::Heartbeat => MSG_HEARTBEAT,
        }
    }

    /// Encode into a wire packet.
    pub fn encode(&self) -> Packet {
        match self {
            ControlMessage::HandshakeRequest { key } => {
                let mut p = Packet::new(MSG_HANDSHAKE_REQ);
                p.append_str(key);
                p
            }
            ControlMessage::HandshakeResponse { code, heartbeat_ms } => {
                let mut p = Packet::new(MSG_HANDSHAKE_RSP);
                p.append_u8(*code);
                p.append_u32(*heartbeat_ms);
                p
            }
            ControlMessage::HandshakeAck => Packet::new(MSG_HANDSHAKE_ACK),
            ControlMessage::Heartbeat => Packet::new(MSG_HEARTBEAT),
        }
    }

    /// Decode a control packet. The packet must carry a control id.
    pub fn decode(packet: &mut Packet) -> Result<ControlMessage> {
        match packet.id() {
            MSG_HANDSHAKE_REQ => {
                if packet.remaining() < 4 {
                    return Err(GateError::MalformedBody(
                        "handshake request missing key length".into(),
                    ));
                }
                let len = packet.read_u32() as usize;
                if len > packet.remaining() {
                    return Err(GateError::MalformedBody(format!(
                        "handshake key length {len} exceeds body"
                    )));
                }
                let key = std::str::from_utf8(packet.read_raw(len))
                    .map_err(|e| GateError::MalformedBody(format!("handshake key utf-8: {e}")))?
                    .to_owned();
                Ok(ControlMessage::HandshakeRequest { key })
            }
            MSG_HANDSHAKE_RSP => {
                if packet.remaining() < 5 {
                    return Err(GateError::MalformedBody(
                        "handshake response truncated".into(),
                    ));
                }
                let code = packet.read_u8();
                let heartbeat_ms = packet.read_u32();
                Ok(ControlMessage::HandshakeResponse { code, heartbeat_ms })
            }
            MSG_HANDSHAKE_ACK => Ok(ControlMessage::HandshakeAck),
            MSG_HEARTBEAT => Ok(ControlMessage::Heartbeat),
            other => Err(GateError::MalformedBody(format!(
                "unknown control message id {other}"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn control_range_is_exclusive_upper_bound() {
        assert!(is_control(0));
        assert!(is_control(CONTROL_ID_MAX - 1));
        assert!(!is_control(CONTROL_ID_MAX));
        assert!(!is_control(u16::MAX));
    }

    #[test]
    fn request_roundtrip() {
        let msg = ControlMessage::HandshakeRequest {
            key: "sesame".into(),
        };
        let mut p = msg.encode();
        assert_eq!(p.id(), MSG_HANDSHAKE_REQ);
        assert_eq!(ControlMessage::decode(&mut p).unwrap(), msg);
    }

    #[test]
    fn response_roundtrip() {
        let msg = ControlMessage::HandshakeResponse {
            code: HANDSHAKE_OK,
            heartbeat_ms: 30_000,
        };
        let mut p = msg.encode();
        assert_eq!(ControlMessage::decode(&mut p).unwrap(), msg);
    }

    #[test]
    fn bodyless_messages_roundtrip() {
        for msg in [ControlMessage::HandshakeAck, ControlMessage::Heartbeat] {
            let mut p = msg.encode();
            assert_eq!(p.body_len(), 0);
            assert_eq!(ControlMessage::decode(&mut p).unwrap(), msg);
        }
    }

    #[test]
    fn truncated_request_reports_malformed() {
        let mut p = Packet::new(MSG_HANDSHAKE_REQ);
        p.append_u16(3);
        assert!(matches!(
            ControlMessage::decode(&mut p),
            Err(GateError::MalformedBody(_))
        ));
    }

    #[test]
    fn lying_key_length_reports_malformed() {
        let mut p = Packet::new(MSG_HANDSHAKE_REQ);
        p.append_u32(1000);
        p.append_raw(b"abc");
        assert!(matches!(
            ControlMessage::decode(&mut p),
            Err(GateError::MalformedBody(_))
        ));
    }

    #[test]
    fn unknown_control_id_reports_malformed() {
        let mut p = Packet::new(9);
        assert!(matches!(
            ControlMessage::decode(&mut p),
            Err(GateError::MalformedBody(_))
        ));
    }
}
