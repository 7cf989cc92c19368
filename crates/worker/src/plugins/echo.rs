// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Echo plugin: answers every task with its own payload.

use dfm_core::command;
use dfm_fabric::{ReplyFn, WorkerPlugin};
use dfm_wire::encode_progress;

/// Minimal plugin used by integration tests and endpoint smoke checks.
pub struct EchoPlugin;

impl WorkerPlugin for EchoPlugin {
    fn name(&self) -> &str {
        "echo"
    }

    fn initialize(&mut self) -> bool {
        true
    }

    fn shutdown(&mut self) {}

    fn handle(&mut self, _cmd: i32, payload: &[u8], reply: ReplyFn<'_>) {
        reply(command::PROGRESS, encode_progress(100));
        let body = if payload.is_empty() { b"OK".to_vec() } else { payload.to_vec() };
        reply(command::RESULT, body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_payload_after_full_progress() {
        let mut plugin = EchoPlugin;
        let mut frames = Vec::new();
        plugin.handle(command::LIST_DIR, b"ping", &mut |cmd, payload| {
            frames.push((cmd, payload));
        });
        assert_eq!(
            frames,
            vec![
                (command::PROGRESS, encode_progress(100)),
                (command::RESULT, b"ping".to_vec()),
            ]
        );
    }

    #[test]
    fn empty_payload_yields_ok() {
        let mut plugin = EchoPlugin;
        let mut frames = Vec::new();
        plugin.handle(command::GET_DISK_USAGE, &[], &mut |cmd, payload| {
            frames.push((cmd, payload));
        });
        assert_eq!(frames.last(), Some(&(command::RESULT, b"OK".to_vec())));
    }
}
