// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker plugin contract and the registry resolving names to factories.
//!
//! A plugin handles task commands synchronously on its host's loop and
//! answers through the reply callback: zero or more `PROGRESS`/`DATA`
//! frames followed by exactly one terminal `RESULT` or `ERROR`.

use std::collections::HashMap;
use std::path::Path;

/// Callback a plugin uses to emit response frames, in emission order.
pub type ReplyFn<'a> = &'a mut dyn FnMut(i32, Vec<u8>);

/// One executor for a protocol's task commands.
pub trait WorkerPlugin: Send {
    /// Plugin name; matches the registry key.
    fn name(&self) -> &str;

    /// Prepare the plugin. Returning false aborts the host.
    fn initialize(&mut self) -> bool;

    /// Release resources. Called once before the host exits.
    fn shutdown(&mut self);

    /// Execute one task command.
    fn handle(&mut self, cmd: i32, payload: &[u8], reply: ReplyFn<'_>);
}

type PluginFactory = fn() -> Box<dyn WorkerPlugin>;

/// Resolves plugin names to constructors.
///
/// Plugins are compiled in and selected by name; the `--plugin` spawn
/// argument still carries a library path for sidecars, resolved through
/// [`plugin_stem`].
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Instantiate a plugin by registry name.
    pub fn create(&self, name: &str) -> Option<Box<dyn WorkerPlugin>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// Instantiate the plugin a library path refers to.
    pub fn create_for_path(&self, path: &Path) -> Option<Box<dyn WorkerPlugin>> {
        self.create(&plugin_stem(path))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

/// Extract the plugin name from a worker library path:
/// `/usr/lib/dfm/workers/libdfm-sftp-worker.so` → `sftp`.
///
/// Falls back to the bare file stem for paths outside the naming scheme.
pub fn plugin_stem(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    stem.strip_prefix("libdfm-")
        .and_then(|s| s.strip_suffix("-worker"))
        .unwrap_or(stem)
        .to_string()
}

#[cfg(test)]
#[path = "plugin_tests.rs"]
mod tests;
