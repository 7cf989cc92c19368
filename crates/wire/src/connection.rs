// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One bidirectional framed byte stream between two endpoints.
//!
//! A `Connection` owns a Unix stream and two tasks: a reader draining the
//! stream through the incremental decoder, and a writer flushing a frame
//! queue. Observers get a single event channel; events arrive in the
//! order the reader saw them, and `Disconnected` is delivered exactly
//! once per connection.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::frame::{encode, Frame, FrameDecoder, ProtocolError};

/// What a connection reports to its observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The stream is up (emitted once, before any command).
    Connected,
    /// One inbound frame.
    Command { cmd: i32, payload: Vec<u8> },
    /// Transport fault; `Disconnected` follows.
    Error(String),
    /// The stream is gone. Nothing follows.
    Disconnected,
}

/// Receiving side of a connection's event stream.
pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

struct Shared {
    open: AtomicBool,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    cancel: CancellationToken,
}

impl Shared {
    /// Tear down once: optional `Error`, then the single `Disconnected`.
    fn close(&self, error: Option<String>) {
        if self.open.swap(false, Ordering::SeqCst) {
            if let Some(reason) = error {
                let _ = self.events.send(ConnectionEvent::Error(reason));
            }
            let _ = self.events.send(ConnectionEvent::Disconnected);
            self.cancel.cancel();
        }
    }
}

/// Handle to a live framed stream.
///
/// Cheap to clone-free: the handle itself is the only sender side; drop
/// it after `close()` to let the tasks wind down.
pub struct Connection {
    outbound: mpsc::UnboundedSender<Frame>,
    shared: Arc<Shared>,
}

impl Connection {
    /// Wrap an established stream (either side of the socket).
    pub fn spawn(stream: UnixStream) -> (Self, ConnectionEvents) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Frame>();

        let shared = Arc::new(Shared {
            open: AtomicBool::new(true),
            events: event_tx,
            cancel: CancellationToken::new(),
        });
        let _ = shared.events.send(ConnectionEvent::Connected);

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(read_loop(read_half, Arc::clone(&shared)));
        tokio::spawn(write_loop(write_half, outbound_rx, Arc::clone(&shared)));

        (Self { outbound: outbound_tx, shared }, event_rx)
    }

    /// Dial a named local endpoint, bounded by `timeout`.
    pub async fn dial(
        path: &Path,
        timeout: Duration,
    ) -> Result<(Self, ConnectionEvents), ProtocolError> {
        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        Ok(Self::spawn(stream))
    }

    /// Queue a frame for transmission. Returns false iff the connection
    /// is closed; an accepted frame is emitted atomically and in order.
    pub fn send(&self, cmd: i32, payload: Vec<u8>) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.outbound.send(Frame::new(cmd, payload)).is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Close the stream. Idempotent; the observer sees one `Disconnected`.
    pub fn close(&self) {
        self.shared.close(None);
    }
}

async fn read_loop(mut read_half: tokio::net::unix::OwnedReadHalf, shared: Arc<Shared>) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            read = read_half.read(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                shared.close(None);
                break;
            }
            Ok(n) => {
                decoder.feed(&buf[..n]);
                loop {
                    match decoder.next() {
                        Ok(Some(frame)) => {
                            let _ = shared.events.send(ConnectionEvent::Command {
                                cmd: frame.cmd,
                                payload: frame.payload,
                            });
                        }
                        Ok(None) => break,
                        Err(e) => {
                            shared.close(Some(e.to_string()));
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "connection read failed");
                shared.close(Some(e.to_string()));
                break;
            }
        }
    }
}

async fn write_loop(
    mut write_half: tokio::net::unix::OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    shared: Arc<Shared>,
) {
    loop {
        let frame = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if !write_one(&mut write_half, &frame, &shared).await {
            let _ = write_half.shutdown().await;
            return;
        }
    }
    // Best-effort drain: frames queued before close still go out.
    while let Ok(frame) = outbound.try_recv() {
        if !write_one(&mut write_half, &frame, &shared).await {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn write_one(
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
    frame: &Frame,
    shared: &Shared,
) -> bool {
    let buf = match encode(frame) {
        Ok(buf) => buf,
        Err(e) => {
            shared.close(Some(e.to_string()));
            return false;
        }
    };
    // write_all retries partial writes until the frame is fully out.
    if write_half.write_all(&buf).await.is_err() {
        shared.close(Some("write failed".to_string()));
        return false;
    }
    true
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
