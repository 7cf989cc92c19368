// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identifier and state machine.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a worker instance.
    ///
    /// Workers are tracked by ID in the pool's arena; the scheduler and
    /// connection tasks carry the ID on every message instead of holding
    /// references to the worker itself.
    pub struct WorkerId("wkr-");
}

/// How a worker executes: on a task inside this process, or in a
/// spawned sidecar process bridged over a local socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Thread,
    Process,
}

crate::simple_display! {
    WorkerKind {
        Thread => "thread",
        Process => "process",
    }
}

/// Worker lifecycle states.
///
/// `None → Idle ⇄ Busy → Dead`. Only the pool moves a worker `Idle → Busy`
/// (acquisition) and only a scheduler release moves it back. `Dead` is
/// terminal and reached exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    None,
    Idle,
    Busy,
    Dead,
}

impl WorkerState {
    /// A worker is alive once it has left `None` and until it dies.
    pub fn is_alive(self) -> bool {
        matches!(self, WorkerState::Idle | WorkerState::Busy)
    }
}

crate::simple_display! {
    WorkerState {
        None => "none",
        Idle => "idle",
        Busy => "busy",
        Dead => "dead",
    }
}
