// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overlay filesystem path normalization.
//!
//! On systems that mount the home directory as an overlay, kernel events
//! report paths inside `upperdir`/`lowerdir` instead of the paths users
//! see. The normalizer rewrites both back to the watch root.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

enum MountSource {
    /// Parse `/proc/mounts`, re-read on refresh.
    Proc,
    /// Fixed layout; refresh is a no-op (tests, exotic setups).
    Fixed,
}

pub struct OverlayMounts {
    root: PathBuf,
    upper: Option<String>,
    lower: Option<String>,
    source: MountSource,
}

impl OverlayMounts {
    /// Detect the overlay covering `root` from `/proc/mounts`.
    pub fn detect(root: &Path) -> Self {
        let mounts = std::fs::read_to_string("/proc/mounts").unwrap_or_default();
        let mut detected = Self::parse(&mounts, root);
        detected.source = MountSource::Proc;
        if detected.is_overlay() {
            info!(upper = ?detected.upper, lower = ?detected.lower, "overlay detected");
        }
        detected
    }

    /// Parse a mount table. Overlay rows carry
    /// `upperdir=`/`lowerdir=` in their options column; the first
    /// lowerdir of a `:` stack wins.
    pub fn parse(mounts: &str, root: &Path) -> Self {
        let mut upper = None;
        let mut lower = None;
        for line in mounts.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 || fields[2] != "overlay" {
                continue;
            }
            if !root.starts_with(fields[1]) {
                continue;
            }
            for option in fields[3].split(',') {
                if let Some(dir) = option.strip_prefix("upperdir=") {
                    upper = Some(dir.to_string());
                } else if let Some(dir) = option.strip_prefix("lowerdir=") {
                    lower = dir.split(':').next().map(str::to_string);
                }
            }
            break;
        }
        Self { root: root.to_path_buf(), upper, lower, source: MountSource::Fixed }
    }

    /// Fixed layout for tests and preconfigured systems.
    pub fn fixed(root: &Path, upper: Option<&str>, lower: Option<&str>) -> Self {
        Self {
            root: root.to_path_buf(),
            upper: upper.map(str::to_string),
            lower: lower.map(str::to_string),
            source: MountSource::Fixed,
        }
    }

    pub fn is_overlay(&self) -> bool {
        self.upper.is_some() || self.lower.is_some()
    }

    /// Re-read the mount table after a mount/unmount event.
    pub fn refresh(&mut self) {
        if matches!(self.source, MountSource::Proc) {
            let mounts = std::fs::read_to_string("/proc/mounts").unwrap_or_default();
            let fresh = Self::parse(&mounts, &self.root);
            debug!(upper = ?fresh.upper, lower = ?fresh.lower, "overlay info refreshed");
            self.upper = fresh.upper;
            self.lower = fresh.lower;
        }
    }

    /// Rewrite an overlay path to its visible location under the root;
    /// paths outside both layers pass through untouched.
    pub fn normalize(&self, path: &str) -> String {
        for layer in [self.upper.as_deref(), self.lower.as_deref()].into_iter().flatten() {
            if let Some(relative) = path.strip_prefix(layer) {
                // Component boundary check: /upper must not claim /upperX.
                if !relative.is_empty() && !relative.starts_with('/') {
                    continue;
                }
                let relative = relative.trim_start_matches('/');
                if relative.is_empty() {
                    return self.root.display().to_string();
                }
                return format!("{}/{}", self.root.display(), relative);
            }
        }
        path.to_string()
    }
}

#[cfg(test)]
#[path = "overlay_tests.rs"]
mod tests;
