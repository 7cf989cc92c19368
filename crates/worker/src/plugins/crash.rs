// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fault-injection plugin: dies mid-task.
//!
//! Exists so supervision paths (worker death while a job is bound) can
//! be exercised end-to-end against the real sidecar binary.

use dfm_fabric::{ReplyFn, WorkerPlugin};

pub struct CrashPlugin;

impl WorkerPlugin for CrashPlugin {
    fn name(&self) -> &str {
        "crash"
    }

    fn initialize(&mut self) -> bool {
        true
    }

    fn shutdown(&mut self) {}

    fn handle(&mut self, _cmd: i32, _payload: &[u8], _reply: ReplyFn<'_>) {
        // Hard exit without a reply; the master sees the process die.
        std::process::exit(7);
    }
}
