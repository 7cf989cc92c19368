// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Master supervisor entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use dfm_supervisor::config::FileConfig;
use dfm_supervisor::{Master, MasterConfig};

/// DFM connection master: supervises a roster of connection workers.
#[derive(Parser)]
#[command(name = "dfm-master", version)]
struct Args {
    /// Listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// Sidecar worker executable advertised to children
    #[arg(short = 'w', long = "worker-path")]
    worker_path: Option<PathBuf>,

    /// Worker plugin directory advertised to children
    #[arg(short = 'd', long = "plugin-dir")]
    plugin_dir: Option<PathBuf>,

    /// Number of worker processes to fork
    #[arg(long)]
    workers: Option<usize>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // The appender guard must outlive the master loop.
    let _guard = match args.log_file {
        Some(ref path) => {
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let file = path.file_name().map(PathBuf::from).unwrap_or_default();
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_writer(std::io::stderr)
                .init();
            None
        }
    };

    let file = match args.config {
        Some(ref path) => match FileConfig::load(path) {
            Ok(file) => file,
            Err(e) => {
                error!(error = %e, "cannot load configuration");
                return ExitCode::from(1);
            }
        },
        None => FileConfig::default(),
    };
    let config = match MasterConfig::resolve(
        file,
        args.port,
        args.workers,
        args.worker_path,
        args.plugin_dir,
    ) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(1);
        }
    };

    let mut master = match Master::new(config) {
        Ok(master) => master,
        Err(e) => {
            error!(error = %e, "master initialization failed");
            return ExitCode::from(1);
        }
    };
    if let Err(e) = master.start() {
        error!(error = %e, "master start failed");
        return ExitCode::from(1);
    }
    match master.run() {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!(error = %e, "master failed");
            ExitCode::from(1)
        }
    }
}
