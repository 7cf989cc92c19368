// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child event loop: accept under the shared mutex, frame client I/O.
//!
//! Each child owns an epoll set over the inherited listening socket and
//! its accepted clients. A listening-socket wakeup is acted on only by
//! the child that wins the accept mutex; the winner drains `accept()`
//! to exhaustion and releases. Client sockets are edge-triggered
//! non-blocking, so reads and writes drain until `WouldBlock`.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use dfm_core::command;
use dfm_wire::{encode, Frame, FrameDecoder};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use tracing::{debug, info, warn};

use crate::error::SupervisorError;
use crate::shm::AcceptMutex;

const WAIT_SLICE_MS: u16 = 100;

/// What to do with one inbound frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Dispatch {
    Reply(Frame),
    Close,
    Ignore,
}

/// Frame semantics of the connection workers: task commands are
/// acknowledged with a `RESULT` echo, disconnect requests are honored,
/// everything else passes without a reply.
pub(crate) fn dispatch_frame(frame: &Frame) -> Dispatch {
    match frame.cmd {
        command::DISCONNECT | command::QUIT => Dispatch::Close,
        cmd if command::is_task(cmd) => {
            Dispatch::Reply(Frame::new(command::RESULT, frame.payload.clone()))
        }
        _ => Dispatch::Ignore,
    }
}

struct ClientConn {
    stream: TcpStream,
    decoder: FrameDecoder,
    outbox: Vec<u8>,
    closing: bool,
}

impl ClientConn {
    fn interest(&self) -> EpollFlags {
        let mut flags = EpollFlags::EPOLLIN | EpollFlags::EPOLLET | EpollFlags::EPOLLRDHUP;
        if !self.outbox.is_empty() {
            flags |= EpollFlags::EPOLLOUT;
        }
        flags
    }
}

/// Run one child's loop until `stop` is raised.
///
/// `listener` and `mutex` are inherited from the master across fork;
/// tests drive the same function on a thread instead.
pub fn run(
    listener: &TcpListener,
    mutex: &AcceptMutex,
    worker_id: usize,
    max_connections: usize,
    stop: &AtomicBool,
) -> Result<(), SupervisorError> {
    let epoll = Epoll::new(EpollCreateFlags::empty())?;
    let listen_key = listener.as_raw_fd() as u64;
    epoll.add(listener.as_fd(), EpollEvent::new(EpollFlags::EPOLLIN, listen_key))?;

    let mut clients: HashMap<u64, ClientConn> = HashMap::new();
    let mut events = [EpollEvent::empty(); 64];
    info!(worker_id, "child loop running");

    while !stop.load(Ordering::SeqCst) {
        let ready = match epoll.wait(&mut events, EpollTimeout::from(WAIT_SLICE_MS)) {
            Ok(ready) => ready,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        };

        for event in &events[..ready] {
            let key = event.data();
            if key == listen_key {
                accept_burst(&epoll, listener, mutex, worker_id, max_connections, &mut clients);
                continue;
            }

            let hangup = event
                .events()
                .intersects(EpollFlags::EPOLLRDHUP | EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR);
            let done = match clients.get_mut(&key) {
                Some(conn) => hangup || !service_client(&epoll, key, conn),
                None => continue,
            };
            if done {
                drop_client(&epoll, &mut clients, key);
            }
        }
    }

    for key in clients.keys().copied().collect::<Vec<_>>() {
        drop_client(&epoll, &mut clients, key);
    }
    info!(worker_id, "child loop stopped");
    Ok(())
}

/// Contend for the accept mutex; the winner drains the backlog.
fn accept_burst(
    epoll: &Epoll,
    listener: &TcpListener,
    mutex: &AcceptMutex,
    worker_id: usize,
    max_connections: usize,
    clients: &mut HashMap<u64, ClientConn>,
) {
    if !mutex.try_lock() {
        // Another child owns this wakeup.
        return;
    }
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                if clients.len() >= max_connections {
                    warn!(worker_id, %peer, "connection limit reached, dropping");
                    continue;
                }
                if stream.set_nonblocking(true).is_err() {
                    continue;
                }
                let key = stream.as_raw_fd() as u64;
                let conn = ClientConn {
                    stream,
                    decoder: FrameDecoder::new(),
                    outbox: Vec::new(),
                    closing: false,
                };
                if epoll.add(conn.stream.as_fd(), EpollEvent::new(conn.interest(), key)).is_ok() {
                    debug!(worker_id, %peer, "accepted connection");
                    clients.insert(key, conn);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(worker_id, error = %e, "accept failed");
                break;
            }
        }
    }
    mutex.unlock();
}

/// Drain readable bytes, dispatch complete frames, flush replies.
/// Returns false once the connection should be dropped.
fn service_client(epoll: &Epoll, key: u64, conn: &mut ClientConn) -> bool {
    let mut buf = [0u8; 4096];
    loop {
        match conn.stream.read(&mut buf) {
            Ok(0) => return false,
            Ok(n) => {
                conn.decoder.feed(&buf[..n]);
                loop {
                    match conn.decoder.next() {
                        Ok(Some(frame)) => match dispatch_frame(&frame) {
                            Dispatch::Reply(reply) => match encode(&reply) {
                                Ok(bytes) => conn.outbox.extend_from_slice(&bytes),
                                Err(e) => {
                                    warn!(error = %e, "reply too large, dropping");
                                }
                            },
                            Dispatch::Close => conn.closing = true,
                            Dispatch::Ignore => {
                                debug!(cmd = frame.cmd, "frame ignored");
                            }
                        },
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "framing violation");
                            return false;
                        }
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return false,
        }
    }

    if !flush_outbox(conn) {
        return false;
    }
    if conn.closing && conn.outbox.is_empty() {
        return false;
    }
    // Re-arm write interest when a reply is still pending.
    epoll
        .modify(conn.stream.as_fd(), &mut EpollEvent::new(conn.interest(), key))
        .is_ok()
}

/// Write queued bytes until empty or the socket pushes back.
fn flush_outbox(conn: &mut ClientConn) -> bool {
    while !conn.outbox.is_empty() {
        match conn.stream.write(&conn.outbox) {
            Ok(0) => return false,
            Ok(n) => {
                conn.outbox.drain(..n);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return false,
        }
    }
    true
}

fn drop_client(epoll: &Epoll, clients: &mut HashMap<u64, ClientConn>, key: u64) {
    if let Some(conn) = clients.remove(&key) {
        let _ = epoll.delete(conn.stream.as_fd());
        let fd: RawFd = conn.stream.as_raw_fd();
        debug!(fd, "connection closed");
    }
}

#[cfg(test)]
#[path = "child_tests.rs"]
mod tests;
