//! Message encoding and decoding with framing.
//!
//! Frame format: `[length: u32 le][message_type: u8][postcard payload]`, where
//! `length` counts the tag byte plus the payload.

use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_MAGIC, PROTOCOL_VERSION};
use thiserror::Error;

/// Largest frame body accepted by the decoders.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

const HEADER_LEN: usize = 4;

/// Errors produced while framing or parsing messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Fewer bytes than a header plus tag.
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    /// Declared length exceeds [`MAX_FRAME_LEN`] or has no room for a tag.
    #[error("invalid frame length {0}")]
    BadLength(usize),
    /// Buffer ends before the declared length.
    #[error("incomplete frame: expected {expected} bytes, got {actual}")]
    Incomplete {
        /// Bytes declared by the header.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },
    /// Tag byte does not match the decoded variant.
    #[error("message tag {tag} does not match payload")]
    TagMismatch {
        /// Tag read from the frame.
        tag: u8,
    },
    /// Payload failed to (de)serialize.
    #[error("postcard: {0}")]
    Postcard(#[from] postcard::Error),
}

/// Compute schema hash from protocol definitions.
///
/// Client and authority refuse each other when their hashes differ.
pub fn compute_schema_hash() -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&PROTOCOL_VERSION.to_le_bytes());
    hasher.update(PROTOCOL_MAGIC);
    for name in [
        "ClientMessage",
        "ServerMessage",
        "InputBundle",
        "TickedInput",
        "ReconciliationSnapshot",
        "CharacterSnapshot",
        "InteractableSnapshot",
        "Health",
    ] {
        hasher.update(name.as_bytes());
    }
    let hash = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

/// Encode a client message with length prefix.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, CodecError> {
    frame(client_message_type_tag(msg), &postcard::to_allocvec(msg)?)
}

/// Encode a server message with length prefix.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, CodecError> {
    frame(server_message_type_tag(msg), &postcard::to_allocvec(msg)?)
}

/// Decode a client message from frame data.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, CodecError> {
    let (tag, payload) = unframe(data)?;
    let msg: ClientMessage = postcard::from_bytes(payload)?;
    if client_message_type_tag(&msg) != tag {
        return Err(CodecError::TagMismatch { tag });
    }
    Ok(msg)
}

/// Decode a server message from frame data.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, CodecError> {
    let (tag, payload) = unframe(data)?;
    let msg: ServerMessage = postcard::from_bytes(payload)?;
    if server_message_type_tag(&msg) != tag {
        return Err(CodecError::TagMismatch { tag });
    }
    Ok(msg)
}

fn frame(tag: u8, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let length = 1 + payload.len();
    if length > MAX_FRAME_LEN {
        return Err(CodecError::BadLength(length));
    }
    let mut frame = Vec::with_capacity(HEADER_LEN + length);
    frame.extend_from_slice(&(length as u32).to_le_bytes());
    frame.push(tag);
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn unframe(data: &[u8]) -> Result<(u8, &[u8]), CodecError> {
    if data.len() < HEADER_LEN + 1 {
        return Err(CodecError::TooShort(data.len()));
    }
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&data[..HEADER_LEN]);
    let length = u32::from_le_bytes(header) as usize;
    if length == 0 || length > MAX_FRAME_LEN {
        return Err(CodecError::BadLength(length));
    }
    let body = &data[HEADER_LEN..];
    if body.len() < length {
        return Err(CodecError::Incomplete {
            expected: length,
            actual: body.len(),
        });
    }
    Ok((body[0], &body[1..length]))
}

fn client_message_type_tag(msg: &ClientMessage) -> u8 {
    match msg {
        ClientMessage::Handshake { .. } => 0,
        ClientMessage::Input(_) => 1,
        ClientMessage::Disconnect { .. } => 2,
    }
}

fn server_message_type_tag(msg: &ServerMessage) -> u8 {
    match msg {
        ServerMessage::HandshakeResponse { .. } => 0,
        ServerMessage::Snapshot(_) => 1,
        ServerMessage::Disconnect { .. } => 2,
        ServerMessage::Interactables(_) => 3,
    }
}
