// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event pipeline errors.
//!
//! Setup failures are fatal to the listener; per-message failures are
//! logged and the offending message is dropped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("netlink socket error: {0}")]
    Socket(#[from] nix::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("generic netlink family {0:?} not available")]
    FamilyNotFound(String),

    #[error("multicast group {0:?} not available")]
    GroupNotFound(String),

    #[error("truncated netlink message")]
    Truncated,

    #[error("mandatory attribute missing: {0}")]
    MissingAttribute(&'static str),

    #[error("malformed attribute {0}: {1}")]
    BadAttribute(&'static str, String),

    #[error("unknown action value: {0}")]
    UnknownAction(u8),
}
