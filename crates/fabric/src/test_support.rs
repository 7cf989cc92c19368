// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for fabric tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dfm_core::command;
use dfm_wire::encode_progress;

use crate::plugin::{PluginRegistry, ReplyFn, WorkerPlugin};
use crate::scheduler::FabricConfig;

/// Replies `PROGRESS(50)` then `RESULT(b"OK")` to any task command.
pub(crate) struct EchoPlugin;

impl WorkerPlugin for EchoPlugin {
    fn name(&self) -> &str {
        "echo"
    }
    fn initialize(&mut self) -> bool {
        true
    }
    fn shutdown(&mut self) {}
    fn handle(&mut self, _cmd: i32, payload: &[u8], reply: ReplyFn<'_>) {
        reply(command::PROGRESS, encode_progress(50));
        let body = if payload.is_empty() { b"OK".to_vec() } else { payload.to_vec() };
        reply(command::RESULT, body);
    }
}

/// Like [`EchoPlugin`] but slow enough to observe running state.
pub(crate) struct SlowPlugin;

impl WorkerPlugin for SlowPlugin {
    fn name(&self) -> &str {
        "slow"
    }
    fn initialize(&mut self) -> bool {
        true
    }
    fn shutdown(&mut self) {}
    fn handle(&mut self, _cmd: i32, _payload: &[u8], reply: ReplyFn<'_>) {
        std::thread::sleep(Duration::from_millis(150));
        reply(command::RESULT, b"OK".to_vec());
    }
}

/// Refuses to initialize; exercises creation-failure paths.
pub(crate) struct BrokenPlugin;

impl WorkerPlugin for BrokenPlugin {
    fn name(&self) -> &str {
        "broken"
    }
    fn initialize(&mut self) -> bool {
        false
    }
    fn shutdown(&mut self) {}
    fn handle(&mut self, _cmd: i32, _payload: &[u8], _reply: ReplyFn<'_>) {}
}

/// Registry with the given factory wired to the `file` protocol.
pub(crate) fn registry_with(
    factory: fn() -> Box<dyn WorkerPlugin>,
) -> Arc<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    registry.register("file", factory);
    Arc::new(registry)
}

/// Config with all paths confined to `dir` and fast timers.
pub(crate) fn test_config(dir: &Path) -> FabricConfig {
    FabricConfig {
        max_workers: 5,
        max_idle: Duration::from_secs(60),
        evict_interval: Duration::from_secs(60),
        worker_bin: dir.join("dfm-worker"),
        plugin_dir: dir.join("plugins"),
        runtime_dir: dir.join("run"),
    }
}
