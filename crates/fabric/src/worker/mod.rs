// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker execution backends.
//!
//! A worker is a record plus a backend; the handle owns the case analysis
//! between the two backends, so no other module matches on worker kind.

mod process;
mod thread;

pub(crate) use process::spawn_process_worker;
pub(crate) use thread::spawn_thread_worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dfm_core::{WorkerId, WorkerKind, WorkerState};

use process::ProcessWorker;
use thread::ThreadWorker;

pub(crate) enum WorkerBackend {
    Thread(ThreadWorker),
    Process(ProcessWorker),
}

/// One executor for a protocol, tracked by ID in the pool's arena.
pub(crate) struct WorkerHandle {
    pub id: WorkerId,
    pub protocol: String,
    pub state: WorkerState,
    /// Cleared by `terminate()`; event forwarders check it so nothing
    /// fires after terminate returns.
    alive: Arc<AtomicBool>,
    backend: WorkerBackend,
}

impl WorkerHandle {
    pub fn new(
        id: WorkerId,
        protocol: impl Into<String>,
        alive: Arc<AtomicBool>,
        backend: WorkerBackend,
    ) -> Self {
        Self { id, protocol: protocol.into(), state: WorkerState::Idle, alive, backend }
    }

    pub fn kind(&self) -> WorkerKind {
        match &self.backend {
            WorkerBackend::Thread(_) => WorkerKind::Thread,
            WorkerBackend::Process(_) => WorkerKind::Process,
        }
    }

    /// Queue a command to the executor. False iff not connected.
    pub fn send(&self, cmd: i32, payload: Vec<u8>) -> bool {
        if !self.is_alive() {
            return false;
        }
        match &self.backend {
            WorkerBackend::Thread(thread) => thread.send(cmd, payload),
            WorkerBackend::Process(process) => process.send(cmd, payload),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive() && self.alive.load(Ordering::SeqCst)
    }

    /// Irreversible stop. Graceful first (QUIT / stop message), hard kill
    /// after the grace window; no signals are delivered afterwards.
    pub fn terminate(&mut self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            match &self.backend {
                WorkerBackend::Thread(thread) => thread.stop(),
                WorkerBackend::Process(process) => process.stop(),
            }
        }
        self.state = WorkerState::Dead;
    }
}
