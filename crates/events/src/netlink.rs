// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic-netlink client for the kernel VFS monitor.
//!
//! The kernel module exposes a generic netlink family (`vfsmonitor`)
//! with one multicast group for dentry events. Family and group IDs are
//! dynamic, so startup resolves them through the nlctrl `GETFAMILY`
//! exchange before joining the group. Messages are TLV sets in host
//! byte order: `{ACT:u8, COOKIE:u32, MAJOR:u16, MINOR:u8, PATH:nul-utf8}`.

use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::Arc;

use dfm_core::{Clock, EventAction, FsEvent};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};
use nix::sys::socket::{self, sockopt, AddressFamily, MsgFlags, NetlinkAddr, SockFlag,
    SockProtocol, SockType};
use nix::sys::time::TimeVal;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::EventError;

pub(crate) const VFSMONITOR_FAMILY: &str = "vfsmonitor";
pub(crate) const VFSMONITOR_GROUP: &str = "vfsmonitor_de";

const NLMSG_HDRLEN: usize = 16;
const GENL_HDRLEN: usize = 4;
const NLA_HDRLEN: usize = 4;

const NLMSG_ERROR: u16 = 2;
const NLM_F_REQUEST: u16 = 1;
const NLA_TYPE_MASK: u16 = 0x3FFF;

const GENL_ID_CTRL: u16 = 0x10;
const CTRL_CMD_GETFAMILY: u8 = 3;
const CTRL_ATTR_FAMILY_ID: u16 = 1;
const CTRL_ATTR_FAMILY_NAME: u16 = 2;
const CTRL_ATTR_MCAST_GROUPS: u16 = 7;
const CTRL_ATTR_MCAST_GRP_NAME: u16 = 1;
const CTRL_ATTR_MCAST_GRP_ID: u16 = 2;

const VFSMONITOR_C_NOTIFY: u8 = 1;
const VFSMONITOR_A_ACT: u16 = 1;
const VFSMONITOR_A_COOKIE: u16 = 2;
const VFSMONITOR_A_MAJOR: u16 = 3;
const VFSMONITOR_A_MINOR: u16 = 4;
const VFSMONITOR_A_PATH: u16 = 5;
const PATH_MAXLEN: usize = 4096;

const RECV_BUF: usize = 8192;
const WAIT_SLICE_MS: u16 = 500;

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

struct NlAttr<'a> {
    ty: u16,
    payload: &'a [u8],
}

/// Walk a TLV attribute run. Lengths are validated against the buffer.
fn parse_attrs(mut bytes: &[u8]) -> Result<Vec<NlAttr<'_>>, EventError> {
    let mut attrs = Vec::new();
    while bytes.len() >= NLA_HDRLEN {
        let len = u16::from_ne_bytes([bytes[0], bytes[1]]) as usize;
        let ty = u16::from_ne_bytes([bytes[2], bytes[3]]) & NLA_TYPE_MASK;
        if len < NLA_HDRLEN || len > bytes.len() {
            return Err(EventError::Truncated);
        }
        attrs.push(NlAttr { ty, payload: &bytes[NLA_HDRLEN..len] });
        let advance = align4(len);
        if advance >= bytes.len() {
            break;
        }
        bytes = &bytes[advance..];
    }
    Ok(attrs)
}

struct NlMsg<'a> {
    ty: u16,
    payload: &'a [u8],
}

/// Split a datagram into its netlink messages.
fn parse_messages(mut bytes: &[u8]) -> Result<Vec<NlMsg<'_>>, EventError> {
    let mut messages = Vec::new();
    while bytes.len() >= NLMSG_HDRLEN {
        let len = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let ty = u16::from_ne_bytes([bytes[4], bytes[5]]);
        if len < NLMSG_HDRLEN || len > bytes.len() {
            return Err(EventError::Truncated);
        }
        messages.push(NlMsg { ty, payload: &bytes[NLMSG_HDRLEN..len] });
        let advance = align4(len);
        if advance >= bytes.len() {
            break;
        }
        bytes = &bytes[advance..];
    }
    Ok(messages)
}

/// `nlctrl GETFAMILY` request for `family`.
fn build_family_query(seq: u32, family: &str) -> Vec<u8> {
    let attr_len = NLA_HDRLEN + family.len() + 1;
    let total = NLMSG_HDRLEN + GENL_HDRLEN + align4(attr_len);

    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&(total as u32).to_ne_bytes());
    buf.extend_from_slice(&GENL_ID_CTRL.to_ne_bytes());
    buf.extend_from_slice(&NLM_F_REQUEST.to_ne_bytes());
    buf.extend_from_slice(&seq.to_ne_bytes());
    buf.extend_from_slice(&0u32.to_ne_bytes()); // pid: kernel fills ours
    buf.push(CTRL_CMD_GETFAMILY);
    buf.push(1); // genl version
    buf.extend_from_slice(&0u16.to_ne_bytes());
    buf.extend_from_slice(&(attr_len as u16).to_ne_bytes());
    buf.extend_from_slice(&CTRL_ATTR_FAMILY_NAME.to_ne_bytes());
    buf.extend_from_slice(family.as_bytes());
    buf.push(0);
    buf.resize(total, 0);
    buf
}

fn nul_str(payload: &[u8]) -> &[u8] {
    match payload.iter().position(|b| *b == 0) {
        Some(nul) => &payload[..nul],
        None => payload,
    }
}

/// Extract the family id and the requested multicast group id from a
/// `GETFAMILY` reply datagram.
fn parse_family_reply(
    datagram: &[u8],
    group_name: &str,
) -> Result<(u16, u32), EventError> {
    for message in parse_messages(datagram)? {
        if message.ty == NLMSG_ERROR {
            return Err(EventError::FamilyNotFound(VFSMONITOR_FAMILY.to_string()));
        }
        if message.ty != GENL_ID_CTRL || message.payload.len() < GENL_HDRLEN {
            continue;
        }

        let mut family_id = None;
        let mut group_id = None;
        for attr in parse_attrs(&message.payload[GENL_HDRLEN..])? {
            match attr.ty {
                CTRL_ATTR_FAMILY_ID if attr.payload.len() >= 2 => {
                    family_id =
                        Some(u16::from_ne_bytes([attr.payload[0], attr.payload[1]]));
                }
                CTRL_ATTR_MCAST_GROUPS => {
                    for entry in parse_attrs(attr.payload)? {
                        let mut name_matches = false;
                        let mut id = None;
                        for field in parse_attrs(entry.payload)? {
                            match field.ty {
                                CTRL_ATTR_MCAST_GRP_NAME => {
                                    name_matches =
                                        nul_str(field.payload) == group_name.as_bytes();
                                }
                                CTRL_ATTR_MCAST_GRP_ID if field.payload.len() >= 4 => {
                                    id = Some(u32::from_ne_bytes([
                                        field.payload[0],
                                        field.payload[1],
                                        field.payload[2],
                                        field.payload[3],
                                    ]));
                                }
                                _ => {}
                            }
                        }
                        if name_matches {
                            group_id = id;
                        }
                    }
                }
                _ => {}
            }
        }

        if let Some(family) = family_id {
            let group = group_id
                .ok_or_else(|| EventError::GroupNotFound(group_name.to_string()))?;
            return Ok((family, group));
        }
    }
    Err(EventError::FamilyNotFound(VFSMONITOR_FAMILY.to_string()))
}

/// Decode one VFS notify payload (genl header plus attributes).
fn parse_vfs_event(payload: &[u8], at_ms: u64) -> Result<FsEvent, EventError> {
    if payload.len() < GENL_HDRLEN {
        return Err(EventError::Truncated);
    }

    let mut act = None;
    let mut cookie = None;
    let mut major = None;
    let mut minor = None;
    let mut path = None;
    for attr in parse_attrs(&payload[GENL_HDRLEN..])? {
        match attr.ty {
            VFSMONITOR_A_ACT if !attr.payload.is_empty() => act = Some(attr.payload[0]),
            VFSMONITOR_A_COOKIE if attr.payload.len() >= 4 => {
                cookie = Some(u32::from_ne_bytes([
                    attr.payload[0],
                    attr.payload[1],
                    attr.payload[2],
                    attr.payload[3],
                ]));
            }
            VFSMONITOR_A_MAJOR if attr.payload.len() >= 2 => {
                major = Some(u16::from_ne_bytes([attr.payload[0], attr.payload[1]]));
            }
            VFSMONITOR_A_MINOR if !attr.payload.is_empty() => {
                minor = Some(attr.payload[0]);
            }
            VFSMONITOR_A_PATH => {
                let bytes = nul_str(attr.payload);
                if bytes.len() > PATH_MAXLEN {
                    return Err(EventError::BadAttribute("path", "exceeds maxlen".into()));
                }
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| EventError::BadAttribute("path", e.to_string()))?;
                path = Some(text.to_string());
            }
            _ => {}
        }
    }

    let act = act.ok_or(EventError::MissingAttribute("act"))?;
    let action = EventAction::try_from(act).map_err(|e| EventError::UnknownAction(e.0))?;
    Ok(FsEvent {
        action,
        cookie: cookie.ok_or(EventError::MissingAttribute("cookie"))?,
        major: major.ok_or(EventError::MissingAttribute("major"))?,
        minor: minor.ok_or(EventError::MissingAttribute("minor"))?,
        path: path.ok_or(EventError::MissingAttribute("path"))?,
        at_ms,
    })
}

fn open_socket() -> Result<OwnedFd, EventError> {
    let fd = socket::socket(
        AddressFamily::Netlink,
        SockType::Raw,
        SockFlag::empty(),
        SockProtocol::NetlinkGeneric,
    )?;
    socket::bind(fd.as_raw_fd(), &NetlinkAddr::new(0, 0))?;
    socket::setsockopt(&fd, sockopt::ReceiveTimeout, &TimeVal::new(5, 0))?;
    Ok(fd)
}

/// Resolve the family and group IDs via nlctrl.
fn resolve_family(fd: &OwnedFd) -> Result<(u16, u32), EventError> {
    let query = build_family_query(1, VFSMONITOR_FAMILY);
    socket::sendto(fd.as_raw_fd(), &query, &NetlinkAddr::new(0, 0), MsgFlags::empty())?;

    let mut buf = vec![0u8; RECV_BUF];
    let n = socket::recv(fd.as_raw_fd(), &mut buf, MsgFlags::empty())?;
    parse_family_reply(&buf[..n], VFSMONITOR_GROUP)
}

/// `NETLINK_ADD_MEMBERSHIP` is not wrapped by nix; issue it directly.
fn join_group(fd: &OwnedFd, group: u32) -> Result<(), EventError> {
    let rc = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_NETLINK,
            libc::NETLINK_ADD_MEMBERSHIP,
            &group as *const u32 as *const libc::c_void,
            std::mem::size_of::<u32>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(EventError::Socket(nix::Error::last()));
    }
    Ok(())
}

/// Listener thread subscribed to the kernel's VFS multicast group.
///
/// Events are forwarded in kernel-delivery order. Stop is cooperative:
/// an eventfd breaks the epoll wait and the thread joins on teardown.
pub struct EventListener {
    thread: Option<std::thread::JoinHandle<()>>,
    stop: Arc<EventFd>,
}

impl EventListener {
    pub fn spawn<C: Clock + 'static>(
        events: UnboundedSender<FsEvent>,
        clock: C,
    ) -> Result<Self, EventError> {
        let fd = open_socket()?;
        let (family, group) = resolve_family(&fd)?;
        join_group(&fd, group)?;
        info!(family, group, "subscribed to VFS monitor");

        let stop = Arc::new(EventFd::from_value_and_flags(0, EfdFlags::EFD_NONBLOCK)?);
        let stop_for_thread = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("vfs-events".to_string())
            .spawn(move || listen_loop(fd, family, events, clock, stop_for_thread))?;

        Ok(Self { thread: Some(thread), stop })
    }

    /// Wake the listener thread and join it.
    pub fn stop(&mut self) {
        let _ = self.stop.write(1);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen_loop<C: Clock>(
    fd: OwnedFd,
    family: u16,
    events: UnboundedSender<FsEvent>,
    clock: C,
    stop: Arc<EventFd>,
) {
    let epoll = match Epoll::new(EpollCreateFlags::empty()) {
        Ok(epoll) => epoll,
        Err(e) => {
            warn!(error = %e, "epoll setup failed");
            return;
        }
    };
    let nl_key = fd.as_raw_fd() as u64;
    let stop_key = stop.as_fd().as_raw_fd() as u64;
    if epoll.add(fd.as_fd(), EpollEvent::new(EpollFlags::EPOLLIN, nl_key)).is_err()
        || epoll.add(stop.as_fd(), EpollEvent::new(EpollFlags::EPOLLIN, stop_key)).is_err()
    {
        warn!("epoll registration failed");
        return;
    }

    let mut buf = vec![0u8; RECV_BUF];
    let mut ready = [EpollEvent::empty(); 8];
    loop {
        let n = match epoll.wait(&mut ready, EpollTimeout::from(WAIT_SLICE_MS)) {
            Ok(n) => n,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => {
                warn!(error = %e, "epoll wait failed");
                return;
            }
        };
        for event in &ready[..n] {
            if event.data() == stop_key {
                debug!("listener stop requested");
                return;
            }
            let received =
                match socket::recv(fd.as_raw_fd(), &mut buf, MsgFlags::MSG_DONTWAIT) {
                    Ok(received) => received,
                    Err(nix::errno::Errno::EAGAIN) => continue,
                    Err(e) => {
                        warn!(error = %e, "netlink recv failed");
                        return;
                    }
                };
            dispatch_datagram(&buf[..received], family, &events, &clock);
        }
    }
}

/// Decode every notify message in a datagram; bad ones are dropped.
fn dispatch_datagram<C: Clock>(
    datagram: &[u8],
    family: u16,
    events: &UnboundedSender<FsEvent>,
    clock: &C,
) {
    let messages = match parse_messages(datagram) {
        Ok(messages) => messages,
        Err(e) => {
            debug!(error = %e, "dropping undecodable datagram");
            return;
        }
    };
    for message in messages {
        if message.ty != family
            || message.payload.first().copied() != Some(VFSMONITOR_C_NOTIFY)
        {
            continue;
        }
        match parse_vfs_event(message.payload, clock.epoch_ms()) {
            Ok(event) => {
                let _ = events.send(event);
            }
            Err(e) => debug!(error = %e, "dropping malformed event"),
        }
    }
}

#[cfg(test)]
#[path = "netlink_tests.rs"]
mod tests;
