// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named local endpoint accepting inbound framed connections.

use std::path::{Path, PathBuf};

use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use crate::connection::{Connection, ConnectionEvents};
use crate::frame::ProtocolError;

/// Generate a fresh endpoint name for a protocol's worker:
/// `dfm-worker-<protocol>-<uuid>`, unique per spawn.
pub fn endpoint_name(protocol: &str) -> String {
    format!("dfm-worker-{}-{}", protocol, Uuid::new_v4())
}

/// An accepted stream, already wrapped as a connection.
pub struct IncomingConnection {
    pub connection: Connection,
    pub events: ConnectionEvents,
}

/// Listens on a named local socket and publishes each accepted stream.
///
/// The socket file is removed on drop; a stale file with the same name is
/// removed before listen so respawns with a reused name cannot collide.
pub struct EndpointServer {
    path: PathBuf,
    cancel: CancellationToken,
}

impl EndpointServer {
    pub fn listen(
        path: &Path,
    ) -> Result<(Self, mpsc::UnboundedReceiver<IncomingConnection>), ProtocolError> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(path)?;
        debug!(path = %path.display(), "endpoint listening");

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let accept_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            let (connection, events) = Connection::spawn(stream);
                            if tx.send(IncomingConnection { connection, events }).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "endpoint accept failed");
                            break;
                        }
                    },
                }
            }
        });

        Ok((Self { path: path.to_path_buf(), cancel }, rx))
    }

    pub fn local_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EndpointServer {
    fn drop(&mut self) {
        self.cancel.cancel();
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_names_are_unique_per_spawn() {
        let a = endpoint_name("sftp");
        let b = endpoint_name("sftp");
        assert!(a.starts_with("dfm-worker-sftp-"));
        assert_ne!(a, b);
    }
}
