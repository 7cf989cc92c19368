// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker sidecar entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use dfm_worker::{plugins, run};

/// DFM worker process: hosts one protocol plugin for the scheduler.
#[derive(Parser)]
#[command(name = "dfm-worker", version)]
struct Args {
    /// Worker plugin to load
    #[arg(short, long, value_name = "plugin_path")]
    plugin: PathBuf,

    /// Endpoint socket to dial for IPC
    #[arg(short, long, value_name = "connection_name")]
    connection: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let registry = plugins::builtin_registry();

    match run(&registry, &args.plugin, &args.connection).await {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!(error = %e, "sidecar failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
