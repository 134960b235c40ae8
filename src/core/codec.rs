//! # Frame Codec
//!
//! Incremental parser and encoder turning a byte stream into discrete
//! [`Packet`]s and back.
//!
//! Decoding is a two-phase state machine held across calls: **header**
//! (exactly [`HEADER_LEN`] bytes: message id + body length, validated against
//! the configured maximum before any allocation) then **body** (exactly
//! body-length bytes into a pool-backed packet). Zero-length bodies emit
//! straight from the header phase. The state survives arbitrarily fragmented
//! reads; a frame arriving one byte at a time decodes identically to one
//! arriving whole.
//!
//! `decode` returning `Ok(None)` means "need more data" and is never a
//! failure. A declared body length above the maximum is fatal to the
//! connection and is rejected without allocating the declared size.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_BODY_LEN;
use crate::core::packet::{Packet, HEADER_LEN};
use crate::error::GateError;

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    /// Accumulating the fixed-size header.
    Header,
    /// Header parsed; accumulating `body_len` body bytes.
    Body { id: u16, body_len: usize },
}

/// Length-prefixed frame codec for use with `tokio_util::codec::Framed`.
#[derive(Debug)]
pub struct PacketCodec {
    max_body_len: usize,
    state: DecodeState,
}

impl PacketCodec {
    pub fn new(max_body_len: usize) -> Self {
        Self {
            max_body_len,
            state: DecodeState::Header,
        }
    }

    pub fn max_body_len(&self) -> usize {
        self.max_body_len
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(MAX_BODY_LEN)
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = GateError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, GateError> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if src.len() < HEADER_LEN {
                        src.reserve(HEADER_LEN - src.len());
                        return Ok(None);
                    }

                    let id = u16::from_le_bytes([src[0], src[1]]);
                    let body_len =
                        u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
                    src.advance(HEADER_LEN);

                    if body_len > self.max_body_len {
                        return Err(GateError::OversizedBody {
                            declared: body_len,
                            max: self.max_body_len,
                        });
                    }

                    if body_len == 0 {
                        return Ok(Some(Packet::with_capacity(id, 0)));
                    }

                    src.reserve(body_len.saturating_sub(src.len()));
                    self.state = DecodeState::Body { id, body_len };
                }
                DecodeState::Body { id, body_len } => {
                    if src.len() < body_len {
                        return Ok(None);
                    }

                    let mut packet = Packet::with_capacity(id, body_len);
                    packet.append_raw(&src[..body_len]);
                    src.advance(body_len);
                    self.state = DecodeState::Header;
                    return Ok(Some(packet));
                }
            }
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = GateError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), GateError> {
        if packet.body_len() > self.max_body_len {
            return Err(GateError::OversizedBody {
                declared: packet.body_len(),
                max: self.max_body_len,
            });
        }
        dst.reserve(packet.data().len());
        dst.extend_from_slice(packet.data());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn frame(id: u16, body: &[u8]) -> Vec<u8> {
        let mut p = Packet::new(id);
        p.append_raw(body);
        p.data().to_vec()
    }

    #[test]
    fn whole_frame_decodes_in_one_call() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::from(&frame(300, b"hello")[..]);

        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.id(), 300);
        assert_eq!(packet.body(), b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn one_byte_fragments_reassemble_exactly_once() {
        let mut codec = PacketCodec::default();
        let wire = frame(42, &[7u8; 500]);
        let mut buf = BytesMut::new();

        let mut emitted = Vec::new();
        for &byte in &wire {
            buf.extend_from_slice(&[byte]);
            if let Some(p) = codec.decode(&mut buf).unwrap() {
                emitted.push(p);
            }
        }

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].id(), 42);
        assert_eq!(emitted[0].body(), &[7u8; 500][..]);
    }

    #[test]
    fn zero_length_body_emits_from_header_phase() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::from(&frame(4, b"")[..]);

        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.id(), 4);
        assert_eq!(packet.body_len(), 0);
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame(1, b"first"));
        buf.extend_from_slice(&frame(2, b"second"));

        let a = codec.decode(&mut buf).unwrap().unwrap();
        let b = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!((a.id(), a.body()), (1, &b"first"[..]));
        assert_eq!((b.id(), b.body()), (2, &b"second"[..]));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversized_declaration_is_fatal_without_allocation() {
        let mut codec = PacketCodec::new(1024);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&9u16.to_le_bytes());
        buf.extend_from_slice(&(1_000_000u32).to_le_bytes());

        match codec.decode(&mut buf) {
            Err(GateError::OversizedBody { declared, max }) => {
                assert_eq!(declared, 1_000_000);
                assert_eq!(max, 1024);
            }
            other => panic!("expected oversize rejection, got {other:?}"),
        }
    }

    #[test]
    fn encoder_rejects_oversized_body() {
        let mut codec = PacketCodec::new(8);
        let mut p = Packet::new(1);
        p.append_raw(&[0u8; 16]);

        let mut dst = BytesMut::new();
        assert!(matches!(
            codec.encode(p, &mut dst),
            Err(GateError::OversizedBody { .. })
        ));
    }

    #[test]
    fn partial_header_is_need_more_data() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::from(&[0x01u8, 0x00, 0x05][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }
}
