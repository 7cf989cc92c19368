// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sidecar worker: a spawned executable bridged over framed IPC.
//!
//! Spawn order: listen on a fresh endpoint, start the child pointing at
//! it, then wait for the child to dial back and report `CONNECTED`. The
//! child's exit status and its connection teardown both feed the fabric
//! event channel; death reporting is idempotent downstream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dfm_core::{command, WorkerId};
use dfm_wire::{endpoint_name, Connection, ConnectionEvent, ConnectionEvents, EndpointServer};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::PoolError;
use crate::event::FabricEvent;
use crate::pool::PoolConfig;

pub(crate) struct ProcessWorker {
    connection: Connection,
    terminate_tx: mpsc::UnboundedSender<()>,
    // Held so the endpoint socket outlives the child.
    _server: EndpointServer,
}

impl ProcessWorker {
    pub fn send(&self, cmd: i32, payload: Vec<u8>) -> bool {
        self.connection.send(cmd, payload)
    }

    /// Ask the child to quit; the lifecycle task enforces the grace
    /// window and closes the connection once the child is gone.
    pub fn stop(&self) {
        self.connection.send(command::QUIT, Vec::new());
        let _ = self.terminate_tx.send(());
    }
}

pub(crate) async fn spawn_process_worker(
    id: WorkerId,
    protocol: &str,
    cfg: &PoolConfig,
    events: mpsc::UnboundedSender<FabricEvent>,
    alive: Arc<AtomicBool>,
) -> Result<ProcessWorker, PoolError> {
    let plugin_name = format!("libdfm-{}-worker.so", protocol);
    let plugin_path = cfg.plugin_dir.join(&plugin_name);
    if !plugin_path.exists() {
        return Err(PoolError::PluginNotFound(plugin_name));
    }

    let endpoint = cfg.runtime_dir.join(endpoint_name(protocol));
    let (server, mut incoming) = EndpointServer::listen(&endpoint)?;

    let mut child = tokio::process::Command::new(&cfg.worker_bin)
        .arg("--plugin")
        .arg(&plugin_path)
        .arg("--connection")
        .arg(&endpoint)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PoolError::SpawnFailed(e.to_string()))?;
    debug!(worker = %id, protocol, pid = ?child.id(), "worker process spawned");

    let (connection, mut connection_events) =
        match timeout(cfg.spawn_timeout, incoming.recv()).await {
            Ok(Some(accepted)) => (accepted.connection, accepted.events),
            Ok(None) => return Err(PoolError::SpawnFailed("endpoint closed".to_string())),
            Err(_) => return Err(PoolError::HandshakeFailed(dfm_wire::ProtocolError::Timeout)),
        };
    wait_for_ready(&mut connection_events, cfg.spawn_timeout).await?;

    let (terminate_tx, terminate_rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_connection_events(
        id,
        connection_events,
        events.clone(),
        Arc::clone(&alive),
    ));
    tokio::spawn(watch_child(id, child, terminate_rx, cfg.terminate_grace, events, alive));

    Ok(ProcessWorker { connection, terminate_tx, _server: server })
}

/// Consume handshake events until the child reports `CONNECTED`.
async fn wait_for_ready(
    events: &mut ConnectionEvents,
    limit: Duration,
) -> Result<(), PoolError> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| PoolError::HandshakeFailed(dfm_wire::ProtocolError::Timeout))?;
        match event {
            Some(ConnectionEvent::Connected) => continue,
            Some(ConnectionEvent::Command { cmd: command::CONNECTED, .. }) => return Ok(()),
            Some(ConnectionEvent::Command { cmd, .. }) => {
                return Err(PoolError::SpawnFailed(format!(
                    "unexpected command {} before ready",
                    cmd
                )))
            }
            Some(ConnectionEvent::Error(reason)) => return Err(PoolError::SpawnFailed(reason)),
            Some(ConnectionEvent::Disconnected) | None => {
                return Err(PoolError::SpawnFailed("worker exited during handshake".to_string()))
            }
        }
    }
}

/// Relay connection events as worker-scoped fabric events.
async fn forward_connection_events(
    id: WorkerId,
    mut connection_events: ConnectionEvents,
    events: mpsc::UnboundedSender<FabricEvent>,
    alive: Arc<AtomicBool>,
) {
    while let Some(event) = connection_events.recv().await {
        if !alive.load(Ordering::SeqCst) {
            break;
        }
        match event {
            ConnectionEvent::Command { cmd, payload } => {
                let _ = events.send(FabricEvent::WorkerCommand { worker: id, cmd, payload });
            }
            ConnectionEvent::Error(reason) => {
                let _ = events.send(FabricEvent::WorkerError { worker: id, reason });
            }
            ConnectionEvent::Disconnected => {
                let _ = events.send(FabricEvent::WorkerDied {
                    worker: id,
                    reason: "connection closed".to_string(),
                });
                break;
            }
            ConnectionEvent::Connected => {}
        }
    }
}

/// Own the child: report unexpected exits, enforce the kill grace window.
async fn watch_child(
    id: WorkerId,
    mut child: tokio::process::Child,
    mut terminate_rx: mpsc::UnboundedReceiver<()>,
    grace: Duration,
    events: mpsc::UnboundedSender<FabricEvent>,
    alive: Arc<AtomicBool>,
) {
    tokio::select! {
        status = child.wait() => {
            if alive.load(Ordering::SeqCst) {
                let reason = match status {
                    Ok(status) => match status.code() {
                        // No exit code means the child was killed by a signal.
                        None => "crashed".to_string(),
                        Some(code) => format!("exit:{}", code),
                    },
                    Err(e) => format!("wait failed: {}", e),
                };
                warn!(worker = %id, reason, "worker process died");
                let _ = events.send(FabricEvent::WorkerDied { worker: id, reason });
            }
        }
        _ = terminate_rx.recv() => {
            if timeout(grace, child.wait()).await.is_err() {
                debug!(worker = %id, "grace expired, killing worker process");
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }
}
