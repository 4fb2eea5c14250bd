//! Acknowledgement decoding.
//!
//! Fixed responses are `status | code | padding`; opcode-echo responses are
//! `opcode | status | code`. A NAK means the panel parsed and refused the
//! frame. Anything else unexpected is a desync.

use crate::profile::{ResponseShape, RevisionProfile};

/// Positive acknowledgement status byte.
pub const ACK: u8 = 0x06;

/// Negative acknowledgement status byte.
pub const NAK: u8 = 0x15;

/// Classified panel response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedResponse {
    Ack,
    /// Rejected, with the panel's reason code.
    Nack(u8),
    /// Wrong length, wrong echo or unknown status.
    Malformed,
}

/// Number of response bytes to read after sending `opcode`.
pub fn response_len(opcode: &[u8], profile: &RevisionProfile) -> usize {
    match profile.response {
        ResponseShape::Fixed { len } => len,
        ResponseShape::OpcodeEcho => opcode.len() + 2,
    }
}

/// Classifies `raw` as the response to a frame with `opcode`.
pub fn decode(raw: &[u8], opcode: &[u8], profile: &RevisionProfile) -> DecodedResponse {
    if raw.len() != response_len(opcode, profile) {
        return DecodedResponse::Malformed;
    }

    let body = match profile.response {
        ResponseShape::Fixed { .. } => raw,
        ResponseShape::OpcodeEcho => match raw.strip_prefix(opcode) {
            Some(rest) => rest,
            None => return DecodedResponse::Malformed,
        },
    };

    match body {
        [ACK, ..] => DecodedResponse::Ack,
        [NAK, code, ..] => DecodedResponse::Nack(*code),
        [NAK] => DecodedResponse::Nack(0),
        _ => DecodedResponse::Malformed,
    }
}

fn build(opcode: &[u8], status: u8, code: u8, profile: &RevisionProfile) -> Vec<u8> {
    let mut out = Vec::with_capacity(response_len(opcode, profile));
    if profile.response == ResponseShape::OpcodeEcho {
        out.extend_from_slice(opcode);
    }
    out.push(status);
    out.push(code);
    out.resize(response_len(opcode, profile), 0);
    out
}

/// Response bytes a panel sends to accept a frame with `opcode`.
pub fn ack_bytes(opcode: &[u8], profile: &RevisionProfile) -> Vec<u8> {
    build(opcode, ACK, 0, profile)
}

/// Response bytes a panel sends to reject a frame with `opcode`.
pub fn nack_bytes(opcode: &[u8], code: u8, profile: &RevisionProfile) -> Vec<u8> {
    build(opcode, NAK, code, profile)
}
