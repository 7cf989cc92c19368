// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process worker: a plugin on its own thread with a message loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dfm_core::{command, WorkerId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::PoolError;
use crate::event::FabricEvent;
use crate::plugin::PluginRegistry;

enum ThreadMsg {
    Command(i32, Vec<u8>),
    Stop,
}

/// Worker backed by a plugin running on a dedicated thread.
///
/// Replies surface as synthetic `WorkerCommand` events with the same
/// shape a remote connection would produce.
pub(crate) struct ThreadWorker {
    tx: mpsc::UnboundedSender<ThreadMsg>,
}

impl ThreadWorker {
    pub fn send(&self, cmd: i32, payload: Vec<u8>) -> bool {
        self.tx.send(ThreadMsg::Command(cmd, payload)).is_ok()
    }

    pub fn stop(&self) {
        let _ = self.tx.send(ThreadMsg::Stop);
    }
}

/// Create a worker hosting the registry's plugin for `plugin_name`.
///
/// The plugin is initialized on the caller before the loop starts so
/// creation failures surface synchronously.
pub(crate) fn spawn_thread_worker(
    id: WorkerId,
    plugin_name: &str,
    registry: &PluginRegistry,
    events: mpsc::UnboundedSender<FabricEvent>,
    alive: Arc<AtomicBool>,
) -> Result<ThreadWorker, PoolError> {
    let mut plugin = registry
        .create(plugin_name)
        .ok_or_else(|| PoolError::UnknownProtocol(plugin_name.to_string()))?;
    if !plugin.initialize() {
        return Err(PoolError::InitFailed(plugin_name.to_string()));
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while let Some(msg) = rx.blocking_recv() {
            match msg {
                ThreadMsg::Stop | ThreadMsg::Command(command::QUIT, _) => break,
                ThreadMsg::Command(cmd, payload) => {
                    let mut reply = |reply_cmd: i32, reply_payload: Vec<u8>| {
                        if alive.load(Ordering::SeqCst) {
                            let _ = events.send(FabricEvent::WorkerCommand {
                                worker: id,
                                cmd: reply_cmd,
                                payload: reply_payload,
                            });
                        }
                    };
                    plugin.handle(cmd, &payload, &mut reply);
                }
            }
        }
        plugin.shutdown();
        debug!(worker = %id, "thread worker stopped");
    });

    Ok(ThreadWorker { tx })
}
