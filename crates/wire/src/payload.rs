// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed payload encodings for the reserved response commands.
//!
//! Scalars are big-endian `i32`; strings are UTF-8 with an `i32` length
//! prefix. Task command payloads are opaque to this layer.

use crate::frame::{Frame, ProtocolError};
use dfm_core::command;

/// Encode a `PROGRESS` percentage.
pub fn encode_progress(percent: i32) -> Vec<u8> {
    percent.to_be_bytes().to_vec()
}

/// Decode a `PROGRESS` percentage.
pub fn decode_progress(payload: &[u8]) -> Result<i32, ProtocolError> {
    let bytes: [u8; 4] = payload
        .try_into()
        .map_err(|_| ProtocolError::MalformedPayload(format!("progress payload of {} bytes", payload.len())))?;
    Ok(i32::from_be_bytes(bytes))
}

/// Encode a length-prefixed UTF-8 string.
pub fn encode_string(s: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + s.len());
    buf.extend_from_slice(&(s.len() as i32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    buf
}

/// Decode a length-prefixed UTF-8 string.
pub fn decode_string(payload: &[u8]) -> Result<String, ProtocolError> {
    if payload.len() < 4 {
        return Err(ProtocolError::MalformedPayload("string shorter than its length prefix".into()));
    }
    let len = i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    if len < 0 || payload.len() - 4 != len as usize {
        return Err(ProtocolError::MalformedPayload(format!(
            "string length prefix {} does not match {} payload bytes",
            len,
            payload.len() - 4
        )));
    }
    String::from_utf8(payload[4..].to_vec())
        .map_err(|_| ProtocolError::MalformedPayload("string is not valid UTF-8".into()))
}

/// An `ERROR(202)` frame carrying a reason string.
pub fn error_frame(reason: &str) -> Frame {
    Frame::new(command::ERROR, encode_string(reason))
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
