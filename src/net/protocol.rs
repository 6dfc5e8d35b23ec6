//! Control protocol messages and their encoding.
//!
//! Three message categories cross the wire: clients send [`WriteRequest`]s,
//! the server answers with [`Reply::State`] and greets every new session with
//! [`Reply::SystemInfo`].  Payloads are postcard-encoded enums inside the
//! length-prefix frames of [`crate::net::codec`]; the enum discriminant is
//! the message tag, so the schema can grow without reframing.
//!
//! Every reply is a self-contained frame — no framing state is carried
//! between replies — and at most one request is decoded per receive-buffer
//! fill.

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::net::codec::{self, CodecError};
use crate::state::{LightState, StateData};

/// Model string reported in the system-info greeting.
pub const MODEL_NAME: &str = "KiLight Mono";

/// One decoded inbound command: the client's desired light output.
/// Transient — handed to the [`WriteRequestSink`] and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub light: LightState,
}

/// Static device identity sent as the greeting on every new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hardware_id: u64,
    pub model: String<16>,
    pub firmware_version: String<16>,
}

impl SystemInfo {
    /// Identity of the running firmware.
    pub fn current(hardware_id: u64) -> Self {
        let mut model = String::new();
        let mut firmware_version = String::new();
        // Both literals fit their capacities; a build where they did not
        // would truncate to empty, never panic.
        let _ = model.push_str(MODEL_NAME);
        let _ = firmware_version.push_str(env!("CARGO_PKG_VERSION"));
        Self {
            hardware_id,
            model,
            firmware_version,
        }
    }
}

/// Inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Write(WriteRequest),
}

/// Outbound messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    SystemInfo(SystemInfo),
    State(StateData),
}

/// Consumer of decoded write commands — the seam to the light-output logic.
/// The callback runs synchronously on the cooperative loop and must not
/// block.
pub trait WriteRequestSink {
    fn on_write_request(&mut self, request: &WriteRequest);
}

/// Decode exactly one request from a receive-buffer fill.
///
/// The payload must be a single well-formed [`Request`] with no trailing
/// bytes; anything else is a protocol error that costs the client its
/// session.
pub fn decode_request(fill: &[u8]) -> Result<Request, CodecError> {
    let payload = codec::decode_frame(fill)?;
    let (request, rest) =
        postcard::take_from_bytes(payload).map_err(|_| CodecError::Malformed)?;
    if !rest.is_empty() {
        return Err(CodecError::Malformed);
    }
    Ok(request)
}

/// Encode a reply as one self-contained frame into `out`.
/// Returns the total frame length.
pub fn encode_reply(reply: &Reply, out: &mut [u8]) -> Result<usize, CodecError> {
    if out.len() <= codec::HEADER_SIZE {
        return Err(CodecError::Oversized);
    }
    let payload_len = postcard::to_slice(reply, &mut out[codec::HEADER_SIZE..])
        .map_err(|_| CodecError::Oversized)?
        .len();
    let header = (payload_len as u32).to_le_bytes();
    out[..codec::HEADER_SIZE].copy_from_slice(&header);
    Ok(codec::HEADER_SIZE + payload_len)
}

/// Client-side helper: encode a request as one frame into `out`.
pub fn encode_request(request: &Request, out: &mut [u8]) -> Result<usize, CodecError> {
    if out.len() <= codec::HEADER_SIZE {
        return Err(CodecError::Oversized);
    }
    let payload_len = postcard::to_slice(request, &mut out[codec::HEADER_SIZE..])
        .map_err(|_| CodecError::Oversized)?
        .len();
    let header = (payload_len as u32).to_le_bytes();
    out[..codec::HEADER_SIZE].copy_from_slice(&header);
    Ok(codec::HEADER_SIZE + payload_len)
}

/// Client-side helper: decode one reply frame.
pub fn decode_reply(fill: &[u8]) -> Result<Reply, CodecError> {
    let payload = codec::decode_frame(fill)?;
    let (reply, rest) = postcard::take_from_bytes(payload).map_err(|_| CodecError::Malformed)?;
    if !rest.is_empty() {
        return Err(CodecError::Malformed);
    }
    Ok(reply)
}
