// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor errors. All of these are fatal to the master.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind listening socket on port {port}: {source}")]
    Listen { port: u16, source: nix::Error },

    #[error("failed to map shared accept mutex: {0}")]
    ShmMap(nix::Error),

    #[error("fork failed: {0}")]
    Fork(nix::Error),

    #[error("signal setup failed: {0}")]
    Signal(nix::Error),

    #[error("another master already holds {0}")]
    AlreadyRunning(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("system call failed: {0}")]
    Sys(#[from] nix::Error),
}
