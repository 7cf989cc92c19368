// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rename correlation and event classification.
//!
//! The kernel reports a rename as a `rename_from_*`/`rename_to_*` pair
//! sharing a cookie. The correlator holds the `from` side until its
//! partner arrives; a pair yields a single rename, an orphan past the
//! timeout is surfaced as a deletion (the file moved out of view).

use std::collections::HashMap;
use std::time::Duration;

use dfm_core::{EventAction, FileChange, FsEvent};
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

struct PendingRename {
    path: String,
    at_ms: u64,
}

pub struct RenameCorrelator {
    pending: HashMap<u32, PendingRename>,
    timeout_ms: u64,
}

impl Default for RenameCorrelator {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl RenameCorrelator {
    pub fn new(timeout: Duration) -> Self {
        Self { pending: HashMap::new(), timeout_ms: timeout.as_millis() as u64 }
    }

    /// Number of `rename_from_*` events awaiting a partner.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Classify one normalized event into user-level changes.
    ///
    /// Unrelated events pass straight through; only rename halves are
    /// held back, so relative order of everything else is preserved.
    pub fn handle(&mut self, event: &FsEvent) -> Vec<FileChange> {
        use EventAction::*;
        let path = event.path.clone();
        match event.action {
            RenameFromFile | RenameFromFolder => {
                self.pending
                    .insert(event.cookie, PendingRename { path, at_ms: event.at_ms });
                Vec::new()
            }
            RenameToFile | RenameToFolder => match self.pending.remove(&event.cookie) {
                Some(from) => {
                    let mut changes =
                        vec![FileChange::Renamed { from: from.path.clone(), to: path.clone() }];
                    if event.action == RenameToFile {
                        changes.push(FileChange::Modified { path });
                    } else {
                        changes.push(FileChange::DirRenamed { from: from.path, to: path });
                    }
                    changes
                }
                None => {
                    // Partner was filtered or preceded our subscription.
                    debug!(cookie = event.cookie, %path, "unpaired rename target");
                    Vec::new()
                }
            },
            NewFile | NewLink | NewSymlink => vec![FileChange::Created { path }],
            NewFolder => vec![FileChange::DirCreated { path }],
            DelFile => vec![FileChange::Deleted { path }],
            DelFolder => vec![FileChange::DirDeleted { path }],
            RenameFile | CloseWriteFile => vec![FileChange::Modified { path }],
            RenameFolder | CloseNowriteFile | Mount | Unmount => Vec::new(),
        }
    }

    /// Expire orphaned `rename_from_*` entries older than the timeout.
    /// Each expired path is reported deleted exactly once.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<FileChange> {
        let timeout_ms = self.timeout_ms;
        let expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, entry)| now_ms.saturating_sub(entry.at_ms) > timeout_ms)
            .map(|(cookie, _)| *cookie)
            .collect();

        let mut changes = Vec::new();
        for cookie in expired {
            if let Some(entry) = self.pending.remove(&cookie) {
                debug!(cookie, path = %entry.path, "rename orphaned, treating as move out");
                changes.push(FileChange::Deleted { path: entry.path });
            }
        }
        changes
    }
}

#[cfg(test)]
#[path = "correlate_tests.rs"]
mod tests;
