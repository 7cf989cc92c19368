// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VFS event vocabulary shared by the netlink listener and its consumers.

use serde::{Deserialize, Serialize};

/// Action values reported by the kernel VFS monitor.
///
/// The numeric values are part of the kernel module's wire contract and
/// must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EventAction {
    NewFile = 0,
    NewLink = 1,
    NewSymlink = 2,
    NewFolder = 3,
    DelFile = 4,
    DelFolder = 5,
    RenameFromFile = 6,
    RenameFromFolder = 7,
    RenameToFile = 8,
    RenameToFolder = 9,
    RenameFile = 10,
    RenameFolder = 11,
    Mount = 12,
    Unmount = 13,
    CloseWriteFile = 14,
    CloseNowriteFile = 15,
}

/// Raised when the kernel reports an action value outside the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown VFS action value: {0}")]
pub struct UnknownAction(pub u8);

impl TryFrom<u8> for EventAction {
    type Error = UnknownAction;

    fn try_from(v: u8) -> Result<Self, UnknownAction> {
        use EventAction::*;
        Ok(match v {
            0 => NewFile,
            1 => NewLink,
            2 => NewSymlink,
            3 => NewFolder,
            4 => DelFile,
            5 => DelFolder,
            6 => RenameFromFile,
            7 => RenameFromFolder,
            8 => RenameToFile,
            9 => RenameToFolder,
            10 => RenameFile,
            11 => RenameFolder,
            12 => Mount,
            13 => Unmount,
            14 => CloseWriteFile,
            15 => CloseNowriteFile,
            other => return Err(UnknownAction(other)),
        })
    }
}

impl EventAction {
    /// Start of a rename pair (`rename_from_*`).
    pub fn is_rename_from(self) -> bool {
        matches!(self, EventAction::RenameFromFile | EventAction::RenameFromFolder)
    }

    /// Completion of a rename pair (`rename_to_*`).
    pub fn is_rename_to(self) -> bool {
        matches!(self, EventAction::RenameToFile | EventAction::RenameToFolder)
    }

    /// Mount-table changes that invalidate overlay information.
    pub fn is_mount_change(self) -> bool {
        matches!(self, EventAction::Mount | EventAction::Unmount)
    }
}

/// One event as decoded from the kernel's netlink TLV message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEvent {
    pub action: EventAction,
    /// Pairs `rename_from_*` with its `rename_to_*` partner.
    pub cookie: u32,
    pub major: u16,
    pub minor: u8,
    pub path: String,
    /// Epoch milliseconds at reception.
    pub at_ms: u64,
}

crate::builder! {
    pub struct FsEventBuilder => FsEvent {
        into {
            path: String = "/tmp/file",
        }
        set {
            action: EventAction = EventAction::NewFile,
            cookie: u32 = 0,
            major: u16 = 8,
            minor: u8 = 1,
            at_ms: u64 = 0,
        }
    }
}

/// A normalized, user-visible file change produced by the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileChange {
    Created { path: String },
    DirCreated { path: String },
    Deleted { path: String },
    DirDeleted { path: String },
    Modified { path: String },
    Renamed { from: String, to: String },
    DirRenamed { from: String, to: String },
}

impl FileChange {
    /// Path the change is anchored at (destination for renames).
    pub fn path(&self) -> &str {
        match self {
            FileChange::Created { path }
            | FileChange::DirCreated { path }
            | FileChange::Deleted { path }
            | FileChange::DirDeleted { path }
            | FileChange::Modified { path } => path,
            FileChange::Renamed { to, .. } | FileChange::DirRenamed { to, .. } => to,
        }
    }
}

#[cfg(test)]
#[path = "fsevent_tests.rs"]
mod tests;
