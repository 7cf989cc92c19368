// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for worker creation and pool operations.

use thiserror::Error;

/// Why the pool could not hand out a worker.
///
/// Creation failures are non-fatal to the pool: the scheduler turns them
/// into a job error and keeps draining its queue.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker plugin not found: {0}")]
    PluginNotFound(String),

    #[error("failed to start worker process: {0}")]
    SpawnFailed(String),

    #[error("worker failed to report ready: {0}")]
    HandshakeFailed(#[from] dfm_wire::ProtocolError),

    #[error("no plugin registered for protocol: {0}")]
    UnknownProtocol(String),

    #[error("plugin initialization failed: {0}")]
    InitFailed(String),
}
