// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File watcher facade: listener, normalizer, correlator, one stream out.

use std::path::PathBuf;
use std::time::Duration;

use dfm_core::{Clock, FileChange, FsEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::correlate::RenameCorrelator;
use crate::error::EventError;
use crate::netlink::EventListener;
use crate::overlay::OverlayMounts;

pub struct WatcherConfig {
    /// Events outside this root are dropped. Defaults to the home dir.
    pub watch_root: PathBuf,
    /// How long a `rename_from_*` may wait for its partner.
    pub rename_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_root: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
            rename_timeout: Duration::from_secs(2),
            sweep_interval: Duration::from_millis(500),
        }
    }
}

/// Owns the listener thread and the normalization pipeline.
pub struct FileWatcher {
    listener: Option<EventListener>,
    cancel: CancellationToken,
}

impl FileWatcher {
    /// Watch the kernel's VFS monitor. Fails when the netlink family is
    /// unavailable (kernel module not loaded).
    pub fn spawn<C: Clock + 'static>(
        config: WatcherConfig,
        clock: C,
    ) -> Result<(Self, mpsc::UnboundedReceiver<FileChange>), EventError> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let listener = EventListener::spawn(raw_tx, clock.clone())?;
        let overlay = OverlayMounts::detect(&config.watch_root);
        let (mut watcher, changes) = Self::from_events(raw_rx, overlay, config, clock);
        watcher.listener = Some(listener);
        Ok((watcher, changes))
    }

    /// Run the pipeline over an externally supplied event stream.
    ///
    /// This is the composition point for tests and for alternative
    /// event sources; `spawn` wires the netlink listener into it.
    pub fn from_events<C: Clock + 'static>(
        mut events: mpsc::UnboundedReceiver<FsEvent>,
        mut overlay: OverlayMounts,
        config: WatcherConfig,
        clock: C,
    ) -> (Self, mpsc::UnboundedReceiver<FileChange>) {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let pump_cancel = cancel.clone();

        let watch_root = config.watch_root.display().to_string();
        let mut correlator = RenameCorrelator::new(config.rename_timeout);
        let sweep_interval = config.sweep_interval;
        info!(watch_root, "file watcher running");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for change in correlator.sweep(clock.epoch_ms()) {
                            let _ = changes_tx.send(change);
                        }
                    }
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        if event.action.is_mount_change() {
                            // Mount moves can rewire the overlay.
                            overlay.refresh();
                            continue;
                        }
                        let Some(event) = normalize(event, &overlay, &watch_root) else {
                            continue;
                        };
                        for change in correlator.handle(&event) {
                            let _ = changes_tx.send(change);
                        }
                    }
                }
            }
        });

        (Self { listener: None, cancel }, changes_rx)
    }

    /// Stop the pipeline; the listener thread joins before returning.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Overlay-rewrite the path, then apply the root and hidden filters.
fn normalize(mut event: FsEvent, overlay: &OverlayMounts, watch_root: &str) -> Option<FsEvent> {
    let path = overlay.normalize(&event.path);
    // Component boundary check: /home/u must not claim /home/u2.
    match path.strip_prefix(watch_root) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {}
        _ => return None,
    }
    if path.contains("/.") {
        debug!(%path, "hidden path dropped");
        return None;
    }
    event.path = path;
    Some(event)
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
