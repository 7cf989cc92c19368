// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Master supervisor: socket ownership, fork roster, signal handling.
//!
//! Signal handlers only raise flags; the run loop polls them. SIGCHLD
//! reaps with `WNOHANG` and re-forks unless a shutdown is in progress,
//! SIGHUP restarts the whole roster, SIGINT/SIGTERM stop everything and
//! wait for every child before returning.

use std::io::Write;
use std::net::TcpListener;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fs2::FileExt;
use nix::sys::signal::{self, SigAction, SigHandler, SigSet, Signal};
use nix::sys::socket::{self, sockopt, AddressFamily, Backlog, SockFlag, SockType, SockaddrIn};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use tracing::{error, info, warn};

use crate::child;
use crate::config::MasterConfig;
use crate::error::SupervisorError;
use crate::shm::AcceptMutex;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);
static RELOAD: AtomicBool = AtomicBool::new(false);
static CHILD_EXITED: AtomicBool = AtomicBool::new(false);
/// Raised by SIGTERM inside a forked child.
static CHILD_STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_master_signal(sig: i32) {
    match Signal::try_from(sig) {
        Ok(Signal::SIGINT) | Ok(Signal::SIGTERM) => SHUTDOWN.store(true, Ordering::SeqCst),
        Ok(Signal::SIGHUP) => RELOAD.store(true, Ordering::SeqCst),
        Ok(Signal::SIGCHLD) => CHILD_EXITED.store(true, Ordering::SeqCst),
        _ => {}
    }
}

extern "C" fn on_child_signal(sig: i32) {
    if matches!(Signal::try_from(sig), Ok(Signal::SIGTERM)) {
        CHILD_STOP.store(true, Ordering::SeqCst);
    }
}

/// Bind the shared listening socket: `SO_REUSEADDR`, non-blocking,
/// wildcard address on `port`. Port 0 asks the kernel for a free one.
pub fn bind_listen_socket(port: u16) -> Result<TcpListener, SupervisorError> {
    let fd = socket::socket(AddressFamily::Inet, SockType::Stream, SockFlag::empty(), None)
        .map_err(|e| SupervisorError::Listen { port, source: e })?;
    socket::setsockopt(&fd, sockopt::ReuseAddr, &true)
        .map_err(|e| SupervisorError::Listen { port, source: e })?;
    let addr = SockaddrIn::new(0, 0, 0, 0, port);
    socket::bind(fd.as_raw_fd(), &addr)
        .map_err(|e| SupervisorError::Listen { port, source: e })?;
    socket::listen(&fd, Backlog::MAXCONN)
        .map_err(|e| SupervisorError::Listen { port, source: e })?;

    let listener = TcpListener::from(fd);
    listener.set_nonblocking(true)?;
    Ok(listener)
}

pub struct Master {
    config: MasterConfig,
    listener: TcpListener,
    mutex: AcceptMutex,
    children: Vec<Pid>,
    // Held for the master's lifetime; exclusivity guard.
    _lock: std::fs::File,
}

impl Master {
    /// Acquire the PID lock, bind the socket, map the accept mutex.
    pub fn new(config: MasterConfig) -> Result<Self, SupervisorError> {
        let mut lock = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&config.lock_path)?;
        lock.try_lock_exclusive().map_err(|_| {
            SupervisorError::AlreadyRunning(config.lock_path.display().to_string())
        })?;
        lock.set_len(0)?;
        writeln!(lock, "{}", std::process::id())?;

        let listener = bind_listen_socket(config.port)?;
        let mutex = AcceptMutex::new()?;
        info!(port = config.port, workers = config.worker_count, "master initialized");

        Ok(Self { config, listener, mutex, children: Vec::new(), _lock: lock })
    }

    /// Install signal handling and fork the initial roster.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        // Children inherit these; sidecar spawns anywhere in the tree
        // resolve the advertised paths.
        if let Some(ref worker_path) = self.config.worker_path {
            std::env::set_var("DFM_WORKER_BIN", worker_path);
        }
        if let Some(ref plugin_dir) = self.config.plugin_dir {
            std::env::set_var("DFM_PLUGIN_DIR", plugin_dir);
        }

        install_master_handlers()?;
        for worker_id in 0..self.config.worker_count {
            self.fork_child(worker_id)?;
        }
        info!(pid = std::process::id(), "master running");
        Ok(())
    }

    /// Poll signal flags until shutdown; reaps and re-forks as needed.
    pub fn run(&mut self) -> Result<(), SupervisorError> {
        loop {
            std::thread::sleep(Duration::from_millis(100));

            if SHUTDOWN.load(Ordering::SeqCst) {
                info!("shutdown requested");
                self.stop();
                return Ok(());
            }
            if RELOAD.swap(false, Ordering::SeqCst) {
                info!("reload requested, restarting children");
                self.stop_children();
                for worker_id in 0..self.config.worker_count {
                    self.fork_child(worker_id)?;
                }
            }
            if CHILD_EXITED.swap(false, Ordering::SeqCst) {
                self.reap();
                // Restore the roster when a child died outside shutdown.
                while self.children.len() < self.config.worker_count {
                    let worker_id = self.children.len();
                    self.fork_child(worker_id)?;
                }
            }
        }
    }

    fn fork_child(&mut self, worker_id: usize) -> Result<(), SupervisorError> {
        match unsafe { fork() }.map_err(SupervisorError::Fork)? {
            ForkResult::Parent { child } => {
                info!(worker_id, pid = %child, "child forked");
                self.children.push(child);
                Ok(())
            }
            ForkResult::Child => {
                let code = match self.child_main(worker_id) {
                    Ok(()) => 0,
                    Err(e) => {
                        error!(worker_id, error = %e, "child failed");
                        1
                    }
                };
                std::process::exit(code);
            }
        }
    }

    /// Everything a forked child runs before exiting.
    fn child_main(&self, worker_id: usize) -> Result<(), SupervisorError> {
        install_child_handlers()?;
        CHILD_STOP.store(false, Ordering::SeqCst);
        child::run(
            &self.listener,
            &self.mutex,
            worker_id,
            self.config.max_connections,
            &CHILD_STOP,
        )
    }

    /// `waitpid(-1, WNOHANG)` until the queue of dead children drains.
    fn reap(&mut self) {
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(WaitStatus::Exited(pid, code)) => {
                    warn!(%pid, code, "child exited");
                    self.children.retain(|child| *child != pid);
                }
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    warn!(%pid, signal = %sig, "child killed");
                    self.children.retain(|child| *child != pid);
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }

    /// SIGTERM each child and wait for every one of them.
    fn stop_children(&mut self) {
        for pid in &self.children {
            let _ = signal::kill(*pid, Signal::SIGTERM);
        }
        for pid in self.children.drain(..) {
            let _ = waitpid(pid, None);
        }
    }

    fn stop(&mut self) {
        self.stop_children();
        info!("all children reaped");
    }
}

fn install_master_handlers() -> Result<(), SupervisorError> {
    let action = SigAction::new(
        SigHandler::Handler(on_master_signal),
        signal::SaFlags::empty(),
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP, Signal::SIGCHLD] {
        unsafe { signal::sigaction(sig, &action) }.map_err(SupervisorError::Signal)?;
    }
    Ok(())
}

fn install_child_handlers() -> Result<(), SupervisorError> {
    let term = SigAction::new(
        SigHandler::Handler(on_child_signal),
        signal::SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { signal::sigaction(Signal::SIGTERM, &term) }.map_err(SupervisorError::Signal)?;

    let default =
        SigAction::new(SigHandler::SigDfl, signal::SaFlags::empty(), SigSet::empty());
    for sig in [Signal::SIGINT, Signal::SIGHUP, Signal::SIGCHLD] {
        unsafe { signal::sigaction(sig, &default) }.map_err(SupervisorError::Signal)?;
    }
    Ok(())
}
