// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the fabric crate.

use std::path::PathBuf;
use std::time::Duration;

/// Sidecar executable: `DFM_WORKER_BIN` > `dfm-worker` next to the
/// current executable > bare name resolved through `PATH`.
pub fn worker_binary() -> PathBuf {
    if let Ok(bin) = std::env::var("DFM_WORKER_BIN") {
        return PathBuf::from(bin);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("dfm-worker");
            if candidate.exists() {
                return candidate;
            }
        }
    }
    PathBuf::from("dfm-worker")
}

/// Worker plugin directory: `DFM_PLUGIN_DIR` > `/usr/lib/dfm/workers`.
pub fn plugin_dir() -> PathBuf {
    match std::env::var("DFM_PLUGIN_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => PathBuf::from("/usr/lib/dfm/workers"),
    }
}

/// Endpoint socket directory: `DFM_RUNTIME_DIR` > `$XDG_RUNTIME_DIR/dfm`
/// > a temp-dir fallback.
pub fn runtime_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DFM_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(xdg).join("dfm");
    }
    std::env::temp_dir().join("dfm")
}

/// How long a spawned sidecar has to dial back and report ready.
pub fn spawn_timeout() -> Duration {
    millis_var("DFM_SPAWN_TIMEOUT_MS").unwrap_or(Duration::from_secs(5))
}

/// Client-side connect timeout for dialing endpoints.
pub fn connect_timeout() -> Duration {
    millis_var("DFM_CONNECT_TIMEOUT_MS").unwrap_or(Duration::from_secs(30))
}

/// Grace window between a graceful stop request and a hard kill.
pub fn terminate_grace() -> Duration {
    millis_var("DFM_TERMINATE_GRACE_MS").unwrap_or(Duration::from_secs(3))
}

fn millis_var(name: &str) -> Option<Duration> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}
