//! Lanchat wire format: the packets exchanged between nodes.
//!
//! Every packet is one MessagePack value with named fields. Values are
//! written back to back on a plain TCP stream; there is no length prefix,
//! the encoding itself marks where a value ends.

use std::io::{self, Cursor};

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

/// Largest value the decoder will buffer before giving up on it.
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

// ── Packet ────────────────────────────────────────────────────────────────────

/// How a receiving node treats a packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketType {
    /// User text. Shown locally and relayed to every other peer.
    #[default]
    Chat,
    /// Control message such as `:id alice`. Routed to the command table.
    Cmd,
    /// Notice generated by a node. Shown locally, never relayed.
    Admin,
    /// Liveness probe. Dropped on receipt.
    Ping,
}

/// A single message on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Display name of the author. Empty for node-generated packets.
    pub user: String,
    /// Text body, or the command line for `Cmd` packets.
    pub message: String,
    #[serde(rename = "type")]
    pub kind: PacketType,
}

impl Packet {
    pub fn chat(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            message: message.into(),
            kind: PacketType::Chat,
        }
    }

    pub fn cmd(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            message: message.into(),
            kind: PacketType::Cmd,
        }
    }

    pub fn admin(message: impl Into<String>) -> Self {
        Self {
            user: String::new(),
            message: message.into(),
            kind: PacketType::Admin,
        }
    }

    pub fn ping() -> Self {
        Self {
            kind: PacketType::Ping,
            ..Self::default()
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] rmp_serde::decode::Error),
    #[error("failed to encode packet: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("packet exceeds {max} bytes (buffered {size})")]
    TooLarge { size: usize, max: usize },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Streaming codec for [`Packet`] values.
///
/// Decoding is resumable: a value cut short by the socket yields `Ok(None)`
/// and is retried once more bytes arrive. A malformed value always consumes
/// at least one byte, so a caller that logs the error and keeps decoding
/// cannot spin on the same input.
#[derive(Debug, Default)]
pub struct PacketCodec;

impl PacketCodec {
    pub fn new() -> Self {
        Self
    }
}

/// True when the decoder ran out of input rather than hitting bad input.
fn is_truncated(err: &rmp_serde::decode::Error) -> bool {
    use rmp_serde::decode::Error;
    match err {
        Error::InvalidMarkerRead(e) | Error::InvalidDataRead(e) => {
            e.kind() == io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&src[..]);
        let result = Packet::deserialize(&mut rmp_serde::Deserializer::new(&mut cursor));
        let consumed = cursor.position() as usize;

        match result {
            Ok(packet) => {
                src.advance(consumed);
                Ok(Some(packet))
            }
            Err(e) if is_truncated(&e) => {
                if src.len() > MAX_PACKET_SIZE {
                    let size = src.len();
                    src.clear();
                    return Err(CodecError::TooLarge {
                        size,
                        max: MAX_PACKET_SIZE,
                    });
                }
                Ok(None)
            }
            Err(e) => {
                src.advance(consumed.clamp(1, src.len()));
                Err(CodecError::Malformed(e))
            }
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let bytes = rmp_serde::to_vec_named(&packet)?;
        dst.reserve(bytes.len());
        dst.put_slice(&bytes);
        Ok(())
    }
}
