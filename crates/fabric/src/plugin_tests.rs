// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;
use yare::parameterized;

struct NullPlugin;

impl WorkerPlugin for NullPlugin {
    fn name(&self) -> &str {
        "null"
    }
    fn initialize(&mut self) -> bool {
        true
    }
    fn shutdown(&mut self) {}
    fn handle(&mut self, _cmd: i32, _payload: &[u8], _reply: ReplyFn<'_>) {}
}

#[parameterized(
    full_scheme = { "/usr/lib/dfm/workers/libdfm-sftp-worker.so", "sftp" },
    nested = { "/opt/dfm/libdfm-file-worker.so", "file" },
    bare = { "/tmp/echo.so", "echo" },
    no_ext = { "search", "search" },
)]
fn plugin_stem_extraction(path: &str, expected: &str) {
    assert_eq!(plugin_stem(&PathBuf::from(path)), expected);
}

#[test]
fn registry_resolves_by_name_and_path() {
    let mut registry = PluginRegistry::new();
    registry.register("null", || Box::new(NullPlugin));

    assert!(registry.contains("null"));
    assert!(registry.create("null").is_some());
    assert!(registry.create("missing").is_none());

    let plugin =
        registry.create_for_path(&PathBuf::from("/usr/lib/dfm/workers/libdfm-null-worker.so"));
    assert_eq!(plugin.map(|p| p.name().to_string()), Some("null".to_string()));
}
