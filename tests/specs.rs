// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level behavior specs: scheduling, pooling, and framing
//! exercised together through the public crate APIs.

use std::time::Duration;

use dfm_core::{command, JobSpec, JobState};
use dfm_fabric::{
    FabricConfig, JobEvent, PluginRegistry, ReplyFn, Scheduler, SchedulerEvent, WorkerPlugin,
};
use dfm_wire::{encode, encode_progress, Frame, FrameDecoder};
use url::Url;

/// Test plugin for the `file` protocol: half progress, then an OK blob.
struct FilePlugin;

impl WorkerPlugin for FilePlugin {
    fn name(&self) -> &str {
        "file"
    }
    fn initialize(&mut self) -> bool {
        true
    }
    fn shutdown(&mut self) {}
    fn handle(&mut self, _cmd: i32, _payload: &[u8], reply: ReplyFn<'_>) {
        reply(command::PROGRESS, encode_progress(50));
        reply(command::RESULT, b"OK".to_vec());
    }
}

/// Slow variant so concurrency effects are observable.
struct SlowFilePlugin;

impl WorkerPlugin for SlowFilePlugin {
    fn name(&self) -> &str {
        "file"
    }
    fn initialize(&mut self) -> bool {
        true
    }
    fn shutdown(&mut self) {}
    fn handle(&mut self, _cmd: i32, _payload: &[u8], reply: ReplyFn<'_>) {
        std::thread::sleep(Duration::from_millis(150));
        reply(command::RESULT, b"OK".to_vec());
    }
}

fn scheduler_with(
    dir: &std::path::Path,
    max_workers: usize,
    factory: fn() -> Box<dyn WorkerPlugin>,
) -> Scheduler {
    let mut registry = PluginRegistry::new();
    registry.register("file", factory);
    let config = FabricConfig {
        max_workers,
        worker_bin: dir.join("dfm-worker"),
        plugin_dir: dir.join("plugins"),
        runtime_dir: dir.join("run"),
        ..FabricConfig::default()
    };
    Scheduler::spawn(config, std::sync::Arc::new(registry))
}

fn file_job() -> JobSpec {
    JobSpec::for_url(
        Url::parse("file:///tmp/x").unwrap(),
        command::GET_DISK_USAGE,
        Vec::new(),
    )
}

#[tokio::test]
async fn single_job_happy_path() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = scheduler_with(dir.path(), 1, || Box::new(FilePlugin));
    let mut observer = scheduler.subscribe();

    let mut handle = scheduler.schedule_job(file_job());
    let id = handle.id;
    let events = handle.wait().await;

    // Started precedes running, which precedes any artifact; the blob
    // lands before the terminal transition.
    let started = events.iter().position(|e| *e == JobEvent::Started).unwrap();
    let running = events
        .iter()
        .position(|e| *e == JobEvent::StateChanged(JobState::Running))
        .unwrap();
    let data = events.iter().position(|e| *e == JobEvent::Data(b"OK".to_vec())).unwrap();
    let finished = events
        .iter()
        .position(|e| *e == JobEvent::StateChanged(JobState::Finished))
        .unwrap();
    assert!(started < running && running < data && data < finished);

    assert_eq!(observer.recv().await, Some(SchedulerEvent::JobStarted { job: id }));
    assert_eq!(
        observer.recv().await,
        Some(SchedulerEvent::JobFinished { job: id, success: true })
    );
    scheduler.shutdown();
}

#[tokio::test]
async fn concurrency_cap_two_of_three() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = scheduler_with(dir.path(), 2, || Box::new(SlowFilePlugin));
    let mut observer = scheduler.subscribe();

    let _a = scheduler.schedule_job(file_job());
    let _b = scheduler.schedule_job(file_job());
    let _c = scheduler.schedule_job(file_job());

    let mut events = Vec::new();
    for _ in 0..6 {
        events.push(observer.recv().await.unwrap());
    }

    // Exactly two jobStarted before any jobFinished.
    let first_finish = events
        .iter()
        .position(|e| matches!(e, SchedulerEvent::JobFinished { .. }))
        .unwrap();
    assert_eq!(first_finish, 2);
    // The freed slot immediately starts the third job.
    assert!(matches!(events[3], SchedulerEvent::JobStarted { .. }));
    scheduler.shutdown();
}

#[tokio::test]
async fn idle_worker_is_reused_not_respawned() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = scheduler_with(dir.path(), 5, || Box::new(FilePlugin));

    scheduler.schedule_job(file_job()).wait().await;
    scheduler.schedule_job(file_job()).wait().await;

    // The release lands right after the terminal event; give it a beat.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = scheduler.pool_stats();
    assert_eq!(stats.total, 1, "second job must reuse the idle worker");
    assert_eq!(stats.idle, 1);
    scheduler.shutdown();
}

#[test]
fn frame_boundary_two_frames_three_chunks() {
    let mut bytes = encode(&Frame::new(100, vec![1, 2, 3])).unwrap();
    bytes.extend(encode(&Frame::new(200, Vec::new())).unwrap());

    // Split at arbitrary positions, including mid-header.
    let chunks = [&bytes[..3], &bytes[3..12], &bytes[12..]];
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    for chunk in chunks {
        decoder.feed(chunk);
        while let Some(frame) = decoder.next().unwrap() {
            frames.push(frame);
        }
    }

    assert_eq!(frames, vec![Frame::new(100, vec![1, 2, 3]), Frame::new(200, Vec::new())]);
}

#[tokio::test]
async fn queued_jobs_drain_in_fifo_order() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = scheduler_with(dir.path(), 1, || Box::new(FilePlugin));
    let mut observer = scheduler.subscribe();

    let first = scheduler.schedule_job(file_job());
    let second = scheduler.schedule_job(file_job());
    let third = scheduler.schedule_job(file_job());
    let submitted = [first.id, second.id, third.id];

    let mut started = Vec::new();
    while started.len() < 3 {
        match observer.recv().await.unwrap() {
            SchedulerEvent::JobStarted { job } => started.push(job),
            SchedulerEvent::JobFinished { .. } => {}
        }
    }
    assert_eq!(started, submitted);
    scheduler.shutdown();
}
