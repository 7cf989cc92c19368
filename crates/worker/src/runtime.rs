// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sidecar event loop: one plugin, one connection, frames in between.

use std::path::Path;
use std::time::Duration;

use dfm_core::command;
use dfm_fabric::PluginRegistry;
use dfm_wire::{error_frame, Connection, ConnectionEvent};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Clean shutdown after `QUIT`.
pub const EXIT_OK: i32 = 0;
/// Endpoint unreachable or plugin initialization failed.
pub const EXIT_CONNECT_FAILED: i32 = 1;
/// The `--plugin` argument named no loadable plugin.
pub const EXIT_PLUGIN_LOAD_FAILED: i32 = 2;

const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Window for the connection's writer to flush before the process
/// exits; stands in for a blocking bytes-written wait.
const WRITE_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("plugin not loadable: {0}")]
    PluginLoad(String),

    #[error("plugin initialization failed: {0}")]
    PluginInit(String),

    #[error("connection error: {0}")]
    Transport(String),
}

impl SidecarError {
    /// Process exit code for the spawn contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            SidecarError::PluginLoad(_) => EXIT_PLUGIN_LOAD_FAILED,
            _ => EXIT_CONNECT_FAILED,
        }
    }
}

/// Host the plugin identified by `plugin_path` against the endpoint at
/// `connection_path`. Returns when the master says quit or the stream
/// goes away.
pub async fn run(
    registry: &PluginRegistry,
    plugin_path: &Path,
    connection_path: &Path,
) -> Result<(), SidecarError> {
    let plugin = registry.create_for_path(plugin_path);

    let dialed = Connection::dial(connection_path, DIAL_TIMEOUT).await;
    let (connection, mut events) = match dialed {
        Ok(pair) => pair,
        Err(e) => {
            return Err(SidecarError::Connect {
                endpoint: connection_path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };

    // Load failure is reported over the wire when possible; the exit
    // code alone reaches the master when dialing already failed.
    let Some(mut plugin) = plugin else {
        let frame = error_frame("plugin not loadable");
        connection.send(frame.cmd, frame.payload);
        tokio::time::sleep(WRITE_SETTLE).await;
        connection.close();
        return Err(SidecarError::PluginLoad(plugin_path.display().to_string()));
    };

    if !plugin.initialize() {
        let frame = error_frame("plugin initialization failed");
        connection.send(frame.cmd, frame.payload);
        tokio::time::sleep(WRITE_SETTLE).await;
        connection.close();
        return Err(SidecarError::PluginInit(plugin.name().to_string()));
    }

    connection.send(command::CONNECTED, Vec::new());
    info!(plugin = plugin.name(), "sidecar ready");

    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Command { cmd: command::QUIT, .. } => {
                debug!("quit requested");
                plugin.shutdown();
                connection.send(command::DISCONNECT, Vec::new());
                tokio::time::sleep(WRITE_SETTLE).await;
                connection.close();
                return Ok(());
            }
            ConnectionEvent::Command { cmd, payload } => {
                let mut reply = |reply_cmd: i32, reply_payload: Vec<u8>| {
                    connection.send(reply_cmd, reply_payload);
                };
                plugin.handle(cmd, &payload, &mut reply);
            }
            ConnectionEvent::Error(reason) => {
                warn!(reason, "connection failed");
                plugin.shutdown();
                return Err(SidecarError::Transport(reason));
            }
            ConnectionEvent::Disconnected => {
                // Master went away mid-task: stop silently, it observes
                // the exit.
                debug!("endpoint closed, exiting");
                plugin.shutdown();
                return Ok(());
            }
            ConnectionEvent::Connected => {}
        }
    }
    Ok(())
}
