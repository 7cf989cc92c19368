// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framed IPC for the task fabric.
//!
//! Wire format: 8-byte header (`cmd: i32` ‖ `size: i32`, both big-endian)
//! followed by `size` payload bytes. Frames on one stream are delivered
//! strictly FIFO; the transport never reorders across command codes.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod connection;
mod frame;
mod payload;
mod server;

pub use connection::{Connection, ConnectionEvent, ConnectionEvents};
pub use frame::{
    encode, read_frame, read_frame_timeout, write_frame, Frame, FrameDecoder, ProtocolError,
    HEADER_LEN, MAX_PAYLOAD,
};
pub use payload::{decode_progress, decode_string, encode_progress, encode_string, error_frame};
pub use server::{endpoint_name, EndpointServer, IncomingConnection};
