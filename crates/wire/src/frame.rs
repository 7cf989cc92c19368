// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame type, incremental decoder, and async read/write helpers.

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Header size: `cmd: i32` ‖ `size: i32`, big-endian.
pub const HEADER_LEN: usize = 8;

/// Payload cap: 16 MiB. Frames above this are rejected on both ends.
pub const MAX_PAYLOAD: usize = 1 << 24;

/// Errors from framing and stream I/O.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame payload too large: {size} bytes (cap {MAX_PAYLOAD})")]
    FrameTooLarge { size: usize },

    #[error("invalid frame size: {0}")]
    InvalidSize(i32),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("operation timed out")]
    Timeout,
}

/// The unit of transfer: a command code and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmd: i32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(cmd: i32, payload: Vec<u8>) -> Self {
        Self { cmd, payload }
    }

    /// A frame with an empty payload (`size = 0`).
    pub fn empty(cmd: i32) -> Self {
        Self { cmd, payload: Vec::new() }
    }
}

/// Serialize a frame: header then payload, one buffer.
///
/// A single buffer per frame is what makes writes atomic — callers hand
/// the whole thing to the stream in one `write_all`, so concurrent sends
/// can never interleave header and payload bytes.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    if frame.payload.len() > MAX_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge { size: frame.payload.len() });
    }
    let mut buf = Vec::with_capacity(HEADER_LEN + frame.payload.len());
    buf.extend_from_slice(&frame.cmd.to_be_bytes());
    buf.extend_from_slice(&(frame.payload.len() as i32).to_be_bytes());
    buf.extend_from_slice(&frame.payload);
    Ok(buf)
}

/// Incremental frame reassembly over an arbitrary chunking of the stream.
///
/// Feed bytes as they arrive, then pop complete frames until `next`
/// returns `None`. The decoder alternates between waiting for a full
/// header and waiting for `expected_size` payload bytes.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Set once a header has been consumed; cleared when its payload ships.
    pending: Option<(i32, usize)>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw stream bytes to the reassembly buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    ///
    /// Frames come out in exactly the order their bytes went in.
    pub fn next(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.pending.is_none() {
            if self.buf.len() < HEADER_LEN {
                return Ok(None);
            }
            let cmd = i32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
            let size = i32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]);
            if size < 0 {
                return Err(ProtocolError::InvalidSize(size));
            }
            let size = size as usize;
            if size > MAX_PAYLOAD {
                return Err(ProtocolError::FrameTooLarge { size });
            }
            self.buf.drain(..HEADER_LEN);
            self.pending = Some((cmd, size));
        }

        // Invariant: pending is Some here.
        let Some((cmd, size)) = self.pending else {
            return Ok(None);
        };
        if self.buf.len() < size {
            return Ok(None);
        }
        let payload: Vec<u8> = self.buf.drain(..size).collect();
        self.pending = None;
        Ok(Some(Frame::new(cmd, payload)))
    }
}

/// Read one frame from the stream.
///
/// EOF before any header byte is a clean `ConnectionClosed`; EOF in the
/// middle of a frame is an I/O error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let n = reader.read(&mut header).await?;
    if n == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    reader.read_exact(&mut header[n..]).await?;

    let cmd = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let size = i32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if size < 0 {
        return Err(ProtocolError::InvalidSize(size));
    }
    let size = size as usize;
    if size > MAX_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge { size });
    }

    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await?;
    Ok(Frame::new(cmd, payload))
}

/// Read one frame, failing with `Timeout` after `timeout`.
///
/// Used during connection setup (waiting for the peer's handshake frame);
/// steady-state reads run unbounded in the connection's reader task.
pub async fn read_frame_timeout<R>(reader: &mut R, timeout: Duration) -> Result<Frame, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, read_frame(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Write one frame to the stream and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let buf = encode(frame)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
