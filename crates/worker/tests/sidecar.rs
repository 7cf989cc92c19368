// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests driving the real sidecar binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dfm_core::{command, JobSpec};
use dfm_fabric::{FabricConfig, JobEvent, PluginRegistry, Scheduler, SchedulerEvent};
use dfm_wire::{decode_progress, ConnectionEvent, EndpointServer};
use url::Url;

const SIDECAR: &str = env!("CARGO_BIN_EXE_dfm-worker");
const TICK: Duration = Duration::from_secs(10);

fn spawn_sidecar(plugin: &str, endpoint: &Path) -> tokio::process::Child {
    tokio::process::Command::new(SIDECAR)
        .arg("--plugin")
        .arg(format!("/usr/lib/dfm/workers/libdfm-{}-worker.so", plugin))
        .arg("--connection")
        .arg(endpoint)
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

async fn next_command(
    events: &mut dfm_wire::ConnectionEvents,
) -> (i32, Vec<u8>) {
    loop {
        match tokio::time::timeout(TICK, events.recv()).await.unwrap() {
            Some(ConnectionEvent::Command { cmd, payload }) => return (cmd, payload),
            Some(ConnectionEvent::Connected) => continue,
            other => panic!("expected command, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn sidecar_handshake_task_and_quit() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = dir.path().join("dfm-worker-echo-test");
    let (_server, mut incoming) = EndpointServer::listen(&endpoint).unwrap();

    let mut child = spawn_sidecar("echo", &endpoint);
    let accepted = tokio::time::timeout(TICK, incoming.recv()).await.unwrap().unwrap();
    let connection = accepted.connection;
    let mut events = accepted.events;

    let (cmd, _) = next_command(&mut events).await;
    assert_eq!(cmd, command::CONNECTED);

    assert!(connection.send(command::LIST_DIR, b"hello".to_vec()));
    let (cmd, payload) = next_command(&mut events).await;
    assert_eq!(cmd, command::PROGRESS);
    assert_eq!(decode_progress(&payload).unwrap(), 100);
    let (cmd, payload) = next_command(&mut events).await;
    assert_eq!(cmd, command::RESULT);
    assert_eq!(payload, b"hello");

    assert!(connection.send(command::QUIT, Vec::new()));
    let (cmd, _) = next_command(&mut events).await;
    assert_eq!(cmd, command::DISCONNECT);

    let status = tokio::time::timeout(TICK, child.wait()).await.unwrap().unwrap();
    assert_eq!(status.code(), Some(0));
}

#[tokio::test]
async fn unknown_plugin_reports_error_and_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = dir.path().join("dfm-worker-none-test");
    let (_server, mut incoming) = EndpointServer::listen(&endpoint).unwrap();

    let mut child = spawn_sidecar("does-not-exist", &endpoint);
    let accepted = tokio::time::timeout(TICK, incoming.recv()).await.unwrap().unwrap();
    let mut events = accepted.events;

    let (cmd, _) = next_command(&mut events).await;
    assert_eq!(cmd, command::ERROR);

    let status = tokio::time::timeout(TICK, child.wait()).await.unwrap().unwrap();
    assert_eq!(status.code(), Some(2));
}

#[tokio::test]
async fn unreachable_endpoint_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = spawn_sidecar("echo", &dir.path().join("never-bound"));
    let status = tokio::time::timeout(TICK, child.wait()).await.unwrap().unwrap();
    assert_eq!(status.code(), Some(1));
}

fn fabric_config(dir: &Path) -> FabricConfig {
    FabricConfig {
        max_workers: 5,
        max_idle: Duration::from_secs(60),
        evict_interval: Duration::from_secs(60),
        worker_bin: PathBuf::from(SIDECAR),
        plugin_dir: dir.join("plugins"),
        runtime_dir: dir.join("run"),
    }
}

/// Touch the plugin marker file the pool checks before spawning.
fn install_plugin(dir: &Path, protocol: &str) {
    let plugins = dir.join("plugins");
    std::fs::create_dir_all(&plugins).unwrap();
    std::fs::write(plugins.join(format!("libdfm-{}-worker.so", protocol)), b"").unwrap();
}

#[tokio::test]
async fn job_runs_on_spawned_process_worker() {
    let dir = tempfile::tempdir().unwrap();
    install_plugin(dir.path(), "echo");
    let scheduler =
        Scheduler::spawn(fabric_config(dir.path()), std::sync::Arc::new(PluginRegistry::new()));

    let spec = JobSpec::for_url(
        Url::parse("echo://host/anything").unwrap(),
        command::LIST_DIR,
        b"payload".to_vec(),
    );
    let mut handle = scheduler.schedule_job(spec);
    let events = tokio::time::timeout(TICK, handle.wait()).await.unwrap();

    assert!(events.contains(&JobEvent::Data(b"payload".to_vec())));
    assert!(events.contains(&JobEvent::Finished { success: true }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(scheduler.pool_stats().busy, 0);
    scheduler.shutdown();
}

#[tokio::test]
async fn worker_death_errors_the_bound_job() {
    let dir = tempfile::tempdir().unwrap();
    install_plugin(dir.path(), "crash");
    let scheduler =
        Scheduler::spawn(fabric_config(dir.path()), std::sync::Arc::new(PluginRegistry::new()));
    let mut observer = scheduler.subscribe();

    let spec = JobSpec::for_url(
        Url::parse("crash://host/x").unwrap(),
        command::GET_DISK_USAGE,
        Vec::new(),
    );
    let mut handle = scheduler.schedule_job(spec);
    let id = handle.id;
    let events = tokio::time::timeout(TICK, handle.wait()).await.unwrap();

    assert!(events
        .contains(&JobEvent::ErrorChanged("Worker process died unexpectedly".to_string())));
    assert!(events.contains(&JobEvent::StateChanged(dfm_core::JobState::Error)));
    assert!(events.contains(&JobEvent::Finished { success: false }));

    let mut finished = None;
    while let Ok(Some(event)) = tokio::time::timeout(TICK, observer.recv()).await {
        if let SchedulerEvent::JobFinished { job, success } = event {
            finished = Some((job, success));
            break;
        }
    }
    assert_eq!(finished, Some((id, false)));

    // The pool holds no reference to the dead worker.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(scheduler.pool_stats().total, 0);
    scheduler.shutdown();
}
