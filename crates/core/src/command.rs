// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command code space for the framed IPC protocol.
//!
//! Codes are partitioned into three bands: system control (`0..=99`),
//! task requests (`100..=199`), and responses (`200..=299`). The transport
//! treats task codes as opaque; only the reserved codes below carry meaning
//! for the fabric itself.

/// No-op placeholder, never sent.
pub const NONE: i32 = 0;
/// Sent by a sidecar once its connection and plugin are ready.
pub const CONNECTED: i32 = 1;
/// Acknowledges an orderly shutdown; sent by either side.
pub const DISCONNECT: i32 = 2;
/// Asks a sidecar to shut down its plugin and exit.
pub const QUIT: i32 = 3;

/// Compute aggregate disk usage for a directory tree.
pub const GET_DISK_USAGE: i32 = 100;
/// List the entries of a directory.
pub const LIST_DIR: i32 = 101;
/// Run a query against the worker's search provider.
pub const SEARCH: i32 = 102;

/// Final artifact of a task; terminal.
pub const RESULT: i32 = 200;
/// Intermediate artifact; the task keeps running.
pub const DATA: i32 = 201;
/// Task failure with a UTF-8 reason; terminal.
pub const ERROR: i32 = 202;
/// Completion percentage, `0..=100`.
pub const PROGRESS: i32 = 203;

/// True for codes in the system control band (`0..=99`).
pub fn is_system(cmd: i32) -> bool {
    (0..=99).contains(&cmd)
}

/// True for codes in the task request band (`100..=199`).
pub fn is_task(cmd: i32) -> bool {
    (100..=199).contains(&cmd)
}

/// True for codes in the response band (`200..=299`).
pub fn is_response(cmd: i32) -> bool {
    (200..=299).contains(&cmd)
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
