// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in worker plugins.

mod crash;
mod du;
mod echo;

pub use crash::CrashPlugin;
pub use du::DiskUsagePlugin;
pub use echo::EchoPlugin;

use dfm_fabric::PluginRegistry;

/// Registry of the plugins compiled into this sidecar.
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register("du", || Box::new(DiskUsagePlugin::new()));
    registry.register("echo", || Box::new(EchoPlugin));
    registry.register("crash", || Box::new(CrashPlugin));
    registry
}
