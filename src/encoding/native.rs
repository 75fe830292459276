//! Native newline-framed packet format.
//!
//! ```text
//! nonce\nsignature\nrealm+schema://tag:tag\npayload...
//! ```
//!
//! The payload is always the last field so it may contain line breaks.
//! Legacy producers put the `realm+` prefix in the signature field; it is
//! moved back onto the key before parsing.

use super::key::parse_key;
use super::DecodeError;
use crate::model::{Message, Packet};

const NEWLINE: char = '\n';
const MIN_CHUNKS: usize = 4;

/// Encodes a packet.
pub fn marshal_packet(packet: &Packet) -> Vec<u8> {
    let fqn = packet.message.key.fqn();
    let mut buf = Vec::with_capacity(
        packet.nonce.len() + packet.signature.len() + fqn.len() + packet.message.payload.len() + 3,
    );
    buf.extend_from_slice(packet.nonce.as_bytes());
    buf.push(b'\n');
    buf.extend_from_slice(packet.signature.as_bytes());
    buf.push(b'\n');
    buf.extend_from_slice(fqn.as_bytes());
    buf.push(b'\n');
    buf.extend_from_slice(packet.message.payload.as_bytes());
    buf
}

/// Decodes a datagram.
pub fn unmarshal_packet(data: &[u8]) -> Result<Packet, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    let text = std::str::from_utf8(data)
        .map_err(|e| DecodeError::MalformedFrame(format!("invalid utf-8: {}", e)))?;

    let chunks: Vec<&str> = text.split(NEWLINE).collect();
    if chunks.len() < MIN_CHUNKS {
        return Err(DecodeError::MalformedFrame(format!(
            "expected at least {} chunks, got {}",
            MIN_CHUNKS,
            chunks.len()
        )));
    }

    let nonce = chunks[0];
    let mut signature = chunks[1];
    let key = match signature.split_once('+') {
        Some((realm, rest)) => {
            signature = rest;
            parse_key(&format!("{}+{}", realm, chunks[2]))?
        }
        None => parse_key(chunks[2])?,
    };

    let payload = chunks[3..].join("\n");
    let message = Message::new(key, payload.trim_end());

    Ok(Packet::new(message, nonce, signature))
}
