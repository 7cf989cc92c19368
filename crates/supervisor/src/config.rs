// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Master configuration: TOML file merged with command-line overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SupervisorError;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// On-disk configuration shape. Every field is optional; CLI flags win.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub worker_count: Option<usize>,
    pub max_connections: Option<usize>,
    pub worker_path: Option<PathBuf>,
    pub plugin_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, SupervisorError> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| SupervisorError::Config(e.to_string()))
    }
}

/// Effective master configuration.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub port: u16,
    pub worker_count: usize,
    pub max_connections: usize,
    /// Sidecar executable advertised to children (`DFM_WORKER_BIN`).
    pub worker_path: Option<PathBuf>,
    /// Plugin directory advertised to children (`DFM_PLUGIN_DIR`).
    pub plugin_dir: Option<PathBuf>,
    /// PID lock file location.
    pub lock_path: PathBuf,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            worker_count: DEFAULT_WORKER_COUNT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            worker_path: None,
            plugin_dir: None,
            lock_path: std::env::temp_dir().join("dfm-master.pid"),
        }
    }
}

impl MasterConfig {
    /// Merge file values under CLI overrides.
    pub fn resolve(
        file: FileConfig,
        port: Option<u16>,
        workers: Option<usize>,
        worker_path: Option<PathBuf>,
        plugin_dir: Option<PathBuf>,
    ) -> Result<Self, SupervisorError> {
        let config = Self {
            port: port.or(file.port).unwrap_or(DEFAULT_PORT),
            worker_count: workers.or(file.worker_count).unwrap_or(DEFAULT_WORKER_COUNT),
            max_connections: file.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            worker_path: worker_path.or(file.worker_path),
            plugin_dir: plugin_dir.or(file.plugin_dir),
            ..Self::default()
        };
        if config.worker_count == 0 {
            return Err(SupervisorError::Config("worker_count must be at least 1".into()));
        }
        Ok(config)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
