// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Disk-usage plugin: directory statistics and listings.
//!
//! Payloads are UTF-8 local paths; results are JSON documents. The walk
//! reports coarse progress as it descends and can be interrupted by a
//! `shutdown` between directories.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dfm_core::command;
use dfm_fabric::{ReplyFn, WorkerPlugin};
use dfm_wire::{encode_progress, encode_string};
use serde_json::json;
use tracing::debug;

pub struct DiskUsagePlugin {
    canceled: Arc<AtomicBool>,
}

struct Usage {
    size: u64,
    file_count: u64,
    dir_count: u64,
}

impl DiskUsagePlugin {
    pub fn new() -> Self {
        Self { canceled: Arc::new(AtomicBool::new(false)) }
    }

    fn usage_of(&self, path: &Path, usage: &mut Usage) {
        let Ok(entries) = std::fs::read_dir(path) else { return };
        for entry in entries.flatten() {
            if self.canceled.load(Ordering::Relaxed) {
                return;
            }
            let Ok(file_type) = entry.file_type() else { continue };
            if file_type.is_dir() {
                usage.dir_count += 1;
                self.usage_of(&entry.path(), usage);
            } else if file_type.is_file() {
                usage.file_count += 1;
                usage.size += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
            // Symlinks and special files count for presence, not size.
        }
    }

    fn handle_disk_usage(&self, path: &Path, reply: ReplyFn<'_>) {
        if !path.exists() {
            reply(command::ERROR, encode_string(&format!("no such path: {}", path.display())));
            return;
        }
        reply(command::PROGRESS, encode_progress(0));

        let mut usage = Usage { size: 0, file_count: 0, dir_count: 0 };
        if path.is_file() {
            usage.file_count = 1;
            usage.size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        } else {
            self.usage_of(path, &mut usage);
        }

        reply(command::PROGRESS, encode_progress(100));
        let result = json!({
            "path": path.display().to_string(),
            "size": usage.size,
            "fileCount": usage.file_count,
            "dirCount": usage.dir_count,
        });
        reply(command::RESULT, result.to_string().into_bytes());
    }

    fn handle_list_dir(&self, path: &Path, reply: ReplyFn<'_>) {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                reply(
                    command::ERROR,
                    encode_string(&format!("cannot list {}: {}", path.display(), e)),
                );
                return;
            }
        };

        let mut listing = Vec::new();
        for entry in entries.flatten() {
            let metadata = entry.metadata().ok();
            listing.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "isDir": metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false),
                "size": metadata.as_ref().map(|m| m.len()).unwrap_or(0),
            }));
        }
        reply(command::RESULT, serde_json::Value::Array(listing).to_string().into_bytes());
    }
}

impl Default for DiskUsagePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPlugin for DiskUsagePlugin {
    fn name(&self) -> &str {
        "du"
    }

    fn initialize(&mut self) -> bool {
        debug!("disk usage plugin initialized");
        true
    }

    fn shutdown(&mut self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    fn handle(&mut self, cmd: i32, payload: &[u8], reply: ReplyFn<'_>) {
        self.canceled.store(false, Ordering::Relaxed);
        let path = match std::str::from_utf8(payload) {
            Ok(path) if !path.is_empty() => Path::new(path).to_path_buf(),
            _ => {
                reply(command::ERROR, encode_string("payload is not a UTF-8 path"));
                return;
            }
        };

        match cmd {
            command::GET_DISK_USAGE => self.handle_disk_usage(&path, reply),
            command::LIST_DIR => self.handle_list_dir(&path, reply),
            other => {
                reply(command::ERROR, encode_string(&format!("command not supported: {}", other)));
            }
        }
    }
}

#[cfg(test)]
#[path = "du_tests.rs"]
mod tests;
