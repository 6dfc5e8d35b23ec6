//! Length-prefix frame layer.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │ Length (4B)│ message payload (N B)    │
//! │ LE u32     │                          │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! Unlike a streaming decoder, this layer deliberately has no carry-over
//! state: one receive-buffer fill holds at most one request, and each queued
//! reply is a complete frame.  A fill that does not start with a complete,
//! size-sane frame is a framing error and costs the client its session.

use core::fmt;

use crate::net::BUFFER_SIZE;

/// Frame header size (4-byte little-endian payload length).
pub const HEADER_SIZE: usize = 4;

/// Maximum frame payload — a frame must fit a session buffer whole.
pub const MAX_PAYLOAD: usize = BUFFER_SIZE - HEADER_SIZE;

/// Framing / message decode errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The fill ends before the announced frame does.
    Truncated,
    /// The header announces a payload larger than a session buffer.
    Oversized,
    /// The payload is not a well-formed message.
    Malformed,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated frame"),
            Self::Oversized => write!(f, "oversized frame"),
            Self::Malformed => write!(f, "malformed message"),
        }
    }
}

impl core::error::Error for CodecError {}

/// Decode the first complete frame from a receive-buffer fill.
///
/// Returns the payload slice.  Bytes past the first frame are ignored by
/// this layer (single-message-per-fill policy — the caller resets the buffer
/// after handling).
pub fn decode_frame(fill: &[u8]) -> Result<&[u8], CodecError> {
    if fill.len() < HEADER_SIZE {
        return Err(CodecError::Truncated);
    }
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&fill[..HEADER_SIZE]);
    let length = u32::from_le_bytes(header) as usize;

    if length == 0 {
        return Err(CodecError::Malformed);
    }
    if length > MAX_PAYLOAD {
        return Err(CodecError::Oversized);
    }
    if fill.len() < HEADER_SIZE + length {
        return Err(CodecError::Truncated);
    }
    Ok(&fill[HEADER_SIZE..HEADER_SIZE + length])
}

/// Encode `payload` as one frame into `out`.
///
/// Returns the total number of bytes written, or `None` if the payload is
/// oversized or `out` is too small (nothing is written in that case).
pub fn encode_frame(payload: &[u8], out: &mut [u8]) -> Option<usize> {
    let total = HEADER_SIZE + payload.len();
    if payload.is_empty() || payload.len() > MAX_PAYLOAD || total > out.len() {
        return None;
    }

    let header = (payload.len() as u32).to_le_bytes();
    out[..HEADER_SIZE].copy_from_slice(&header);
    out[HEADER_SIZE..total].copy_from_slice(payload);
    Some(total)
}
