//! Fuzz target: frame and request decoding
//!
//! Drives arbitrary byte sequences through the length-prefix frame layer and
//! the request decoder and asserts that neither panics, and that a decoded
//! payload never exceeds the frame bound.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use kilight::net::codec::{self, MAX_PAYLOAD};
use kilight::net::protocol;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The fill may contain any length prefix, garbage, or trailing bytes.
    if let Ok(payload) = codec::decode_frame(data) {
        assert!(!payload.is_empty(), "decoder must not yield an empty payload");
        assert!(payload.len() <= MAX_PAYLOAD, "payload exceeds MAX_PAYLOAD");
    }

    // Request decode is strictly narrower: whatever the frame layer rejects
    // it must reject too, and malformed payloads come back as typed errors.
    let _ = protocol::decode_request(data);
});
