// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! dfm-worker: sidecar runtime hosting one worker plugin.
//!
//! The scheduler spawns this executable per process worker. It loads the
//! requested plugin, dials back to the endpoint it was given, announces
//! readiness, and bridges frames to the plugin until told to quit.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod plugins;
mod runtime;

pub use runtime::{run, SidecarError, EXIT_CONNECT_FAILED, EXIT_OK, EXIT_PLUGIN_LOAD_FAILED};
