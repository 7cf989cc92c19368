// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job dispatch under a concurrency cap.
//!
//! All queue/binding/count mutations happen under one mutex. Worker
//! signals and completion continuations arrive through the fabric event
//! channel and re-enter that mutex from the scheduler's own loop task,
//! so no completion ever runs re-entrantly inside a caller's stack.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dfm_core::{command, Clock, JobId, JobSpec, JobState, SystemClock, WorkerId};
use dfm_wire::{decode_progress, decode_string};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::env;
use crate::event::{FabricEvent, SchedulerEvent};
use crate::job::{JobHandle, JobRecord};
use crate::plugin::PluginRegistry;
use crate::pool::{PoolConfig, PoolStats, WorkerPool};

/// Error string a job carries when its worker dies under it.
const WORKER_DIED: &str = "Worker process died unexpectedly";

/// Tunables for the fabric. `default()` resolves paths from the
/// environment and applies the stock limits.
pub struct FabricConfig {
    /// Concurrency cap; running jobs never exceed it.
    pub max_workers: usize,
    /// Idle workers older than this are evicted.
    pub max_idle: Duration,
    pub evict_interval: Duration,
    pub worker_bin: PathBuf,
    pub plugin_dir: PathBuf,
    pub runtime_dir: PathBuf,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            max_idle: Duration::from_secs(60),
            evict_interval: Duration::from_secs(60),
            worker_bin: env::worker_binary(),
            plugin_dir: env::plugin_dir(),
            runtime_dir: env::runtime_dir(),
        }
    }
}

struct SchedState {
    queue: VecDeque<JobId>,
    jobs: HashMap<JobId, JobRecord>,
    bindings: HashMap<JobId, WorkerId>,
    worker_jobs: HashMap<WorkerId, JobId>,
    running: usize,
    max_workers: usize,
}

struct Inner<C: Clock> {
    state: Mutex<SchedState>,
    pool: WorkerPool<C>,
    events: mpsc::UnboundedSender<FabricEvent>,
    observers: Mutex<Vec<mpsc::UnboundedSender<SchedulerEvent>>>,
}

/// Central dispatcher of jobs to pooled workers.
pub struct Scheduler<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
    cancel: CancellationToken,
}

impl Scheduler<SystemClock> {
    /// Spawn a scheduler with the system clock.
    pub fn spawn(config: FabricConfig, registry: Arc<PluginRegistry>) -> Self {
        Self::spawn_with_clock(config, registry, SystemClock)
    }
}

impl<C: Clock + 'static> Scheduler<C> {
    /// Spawn the scheduler's loop and idle-eviction tasks.
    pub fn spawn_with_clock(
        config: FabricConfig,
        registry: Arc<PluginRegistry>,
        clock: C,
    ) -> Self {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(
            PoolConfig {
                worker_bin: config.worker_bin,
                plugin_dir: config.plugin_dir,
                runtime_dir: config.runtime_dir,
                registry,
                spawn_timeout: env::spawn_timeout(),
                terminate_grace: env::terminate_grace(),
            },
            events_tx.clone(),
            clock,
        );
        let inner = Arc::new(Inner {
            state: Mutex::new(SchedState {
                queue: VecDeque::new(),
                jobs: HashMap::new(),
                bindings: HashMap::new(),
                worker_jobs: HashMap::new(),
                running: 0,
                max_workers: config.max_workers,
            }),
            pool,
            events: events_tx,
            observers: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();

        let loop_inner = Arc::clone(&inner);
        let loop_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    event = events_rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                loop_inner.handle_event(event).await;
            }
        });

        let evict_inner = Arc::clone(&inner);
        let evict_cancel = cancel.clone();
        let (max_idle, evict_interval) = (config.max_idle, config.evict_interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(evict_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = evict_cancel.cancelled() => break,
                    _ = ticker.tick() => evict_inner.pool.evict_idle(max_idle),
                }
            }
        });

        Self { inner, cancel }
    }

    /// Enqueue a job and kick the queue. The returned handle observes
    /// the job until its terminal event.
    pub fn schedule_job(&self, spec: JobSpec) -> JobHandle {
        let (record, handle) = JobRecord::new(spec);
        {
            let mut state = self.inner.state.lock();
            state.queue.push_back(handle.id);
            state.jobs.insert(handle.id, record);
        }
        debug!(job = %handle.id, "job scheduled");
        let _ = self.inner.events.send(FabricEvent::ProcessQueue);
        handle
    }

    /// Cancel a queued or running job. Queued jobs are removed in place
    /// (O(n) by identity); running jobs release their worker and free a
    /// slot for the next queued job.
    pub fn cancel_job(&self, id: JobId) -> bool {
        let cancelled = {
            let mut state = self.inner.state.lock();
            if let Some(pos) = state.queue.iter().position(|queued| *queued == id) {
                state.queue.remove(pos);
                if let Some(mut record) = state.jobs.remove(&id) {
                    record.set_state(JobState::Canceled);
                }
                self.inner.notify(SchedulerEvent::JobFinished { job: id, success: false });
                true
            } else if state.jobs.get(&id).is_some_and(|record| record.state.can_cancel()) {
                if let Some(record) = state.jobs.get_mut(&id) {
                    record.set_state(JobState::Canceled);
                }
                self.inner.finish_job(&mut state, id, false, true);
                true
            } else {
                false
            }
        };
        if cancelled {
            let _ = self.inner.events.send(FabricEvent::ProcessQueue);
        }
        cancelled
    }

    /// Pause a running job. The bound worker stays bound.
    pub fn pause_job(&self, id: JobId) -> bool {
        let mut state = self.inner.state.lock();
        match state.jobs.get_mut(&id) {
            Some(record) if record.state.can_pause() => {
                record.set_state(JobState::Paused);
                true
            }
            _ => false,
        }
    }

    pub fn resume_job(&self, id: JobId) -> bool {
        let mut state = self.inner.state.lock();
        match state.jobs.get_mut(&id) {
            Some(record) if record.state.can_resume() => {
                record.set_state(JobState::Running);
                true
            }
            _ => false,
        }
    }

    /// Terminate a detached (URL-less) job whose work is driven outside
    /// the fabric.
    pub fn complete_job(&self, id: JobId, success: bool) -> bool {
        let completed = {
            let mut state = self.inner.state.lock();
            match state.jobs.get_mut(&id) {
                Some(record) if !record.state.is_terminal() => {
                    record
                        .set_state(if success { JobState::Finished } else { JobState::Error });
                    self.inner.finish_job(&mut state, id, success, true);
                    true
                }
                _ => false,
            }
        };
        if completed {
            let _ = self.inner.events.send(FabricEvent::ProcessQueue);
        }
        completed
    }

    /// Raise or lower the concurrency cap. Values below 1 are ignored.
    pub fn set_max_workers(&self, count: usize) {
        if count > 0 {
            self.inner.state.lock().max_workers = count;
            let _ = self.inner.events.send(FabricEvent::ProcessQueue);
        }
    }

    pub fn max_workers(&self) -> usize {
        self.inner.state.lock().max_workers
    }

    /// Observe `JobStarted`/`JobFinished` for every job.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SchedulerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.observers.lock().push(tx);
        rx
    }

    pub fn job_state(&self, id: JobId) -> Option<JobState> {
        self.inner.state.lock().jobs.get(&id).map(|record| record.state)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Idle worker count for one protocol (test observability).
    pub fn idle_workers(&self, protocol: &str) -> usize {
        self.inner.pool.idle_count(protocol)
    }

    /// Cancel everything, terminate all workers, stop the loop tasks.
    pub fn shutdown(&self) {
        let ids: Vec<JobId> = {
            let state = self.inner.state.lock();
            state.jobs.keys().copied().collect()
        };
        for id in ids {
            let mut state = self.inner.state.lock();
            if let Some(record) = state.jobs.get_mut(&id) {
                if !record.state.is_terminal() {
                    record.set_state(JobState::Canceled);
                }
            }
            state.queue.retain(|queued| *queued != id);
            if state.bindings.contains_key(&id) {
                self.inner.finish_job(&mut state, id, false, true);
            } else {
                state.jobs.remove(&id);
            }
        }
        self.inner.pool.terminate_all();
        self.cancel.cancel();
        info!("scheduler shut down");
    }
}

impl<C: Clock> Drop for Scheduler<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<C: Clock> Inner<C> {
    async fn handle_event(&self, event: FabricEvent) {
        match event {
            FabricEvent::ProcessQueue => self.process_queue().await,
            FabricEvent::WorkerCommand { worker, cmd, payload } => {
                if self.on_worker_command(worker, cmd, payload) {
                    self.process_queue().await;
                }
            }
            FabricEvent::WorkerError { worker, reason } => {
                if self.on_worker_error(worker, &reason) {
                    self.process_queue().await;
                }
            }
            FabricEvent::WorkerDied { worker, reason } => {
                if self.on_worker_died(worker, &reason) {
                    self.process_queue().await;
                }
            }
        }
    }

    /// Start queued jobs until the queue drains or the cap is reached.
    async fn process_queue(&self) {
        loop {
            // Reserve a slot and claim the next job under the lock;
            // worker acquisition awaits outside it.
            let claimed = {
                let mut state = self.state.lock();
                if state.running >= state.max_workers {
                    break;
                }
                let Some(id) = state.queue.pop_front() else { break };
                state.running += 1;
                let Some(record) = state.jobs.get_mut(&id) else {
                    state.running -= 1;
                    continue;
                };
                record.set_state(JobState::Starting);
                (id, record.spec.protocol().map(str::to_string))
            };
            let (id, protocol) = claimed;

            match protocol {
                None => {
                    // Detached job: counts against the cap, runs no worker
                    // command; the owner finishes it via complete_job.
                    let mut state = self.state.lock();
                    if let Some(record) = state.jobs.get_mut(&id) {
                        record.emit_started();
                        record.set_state(JobState::Running);
                    }
                    self.notify(SchedulerEvent::JobStarted { job: id });
                }
                Some(protocol) => match self.pool.acquire(&protocol).await {
                    Ok(worker) => self.start_on_worker(id, worker),
                    Err(e) => {
                        warn!(job = %id, protocol, error = %e, "no worker for job");
                        let mut state = self.state.lock();
                        state.running -= 1;
                        if let Some(record) = state.jobs.get_mut(&id) {
                            record.set_error(format!(
                                "no worker for protocol {}: {}",
                                protocol, e
                            ));
                            record.set_state(JobState::Error);
                        }
                        state.jobs.remove(&id);
                        self.notify(SchedulerEvent::JobFinished { job: id, success: false });
                    }
                },
            }
        }
    }

    /// Bind an acquired worker and launch the job's task command.
    fn start_on_worker(&self, id: JobId, worker: WorkerId) {
        let start = {
            let mut state = self.state.lock();
            let Some(record) = state.jobs.get_mut(&id) else {
                // Job vanished while the worker was being created.
                state.running -= 1;
                self.pool.release(worker);
                return;
            };
            record.emit_started();
            record.set_state(JobState::Running);
            let start = (record.spec.command, record.spec.payload.clone());
            state.bindings.insert(id, worker);
            state.worker_jobs.insert(worker, id);
            start
        };
        self.notify(SchedulerEvent::JobStarted { job: id });
        info!(job = %id, worker = %worker, "job started");

        let (cmd, payload) = start;
        if !self.pool.send(worker, cmd, payload) {
            // The worker fell over between acquire and dispatch; its
            // death event will error the job.
            warn!(job = %id, worker = %worker, "start command not delivered");
        }
    }

    /// Route a worker frame to its bound job. Returns true when the job
    /// reached a terminal state and a slot was freed.
    fn on_worker_command(&self, worker: WorkerId, cmd: i32, payload: Vec<u8>) -> bool {
        let mut state = self.state.lock();
        let Some(&id) = state.worker_jobs.get(&worker) else {
            debug!(worker = %worker, cmd, "frame from unbound worker ignored");
            return false;
        };
        let Some(record) = state.jobs.get_mut(&id) else { return false };

        match cmd {
            command::PROGRESS => {
                match decode_progress(&payload) {
                    Ok(percent) => record.set_progress(percent),
                    Err(e) => warn!(job = %id, error = %e, "bad progress payload"),
                }
                false
            }
            command::DATA => {
                record.emit_data(payload);
                false
            }
            command::RESULT => {
                record.emit_data(payload);
                record.set_state(JobState::Finished);
                self.finish_job(&mut state, id, true, true);
                true
            }
            command::ERROR => {
                let reason = decode_string(&payload)
                    .unwrap_or_else(|_| "unreadable error payload".to_string());
                record.set_error(reason);
                record.set_state(JobState::Error);
                self.finish_job(&mut state, id, false, true);
                true
            }
            other => {
                debug!(job = %id, cmd = other, "ignoring unexpected command");
                false
            }
        }
    }

    fn on_worker_error(&self, worker: WorkerId, reason: &str) -> bool {
        let mut state = self.state.lock();
        let Some(&id) = state.worker_jobs.get(&worker) else { return false };
        if let Some(record) = state.jobs.get_mut(&id) {
            record.set_error(reason);
            record.set_state(JobState::Error);
        }
        self.finish_job(&mut state, id, false, true);
        true
    }

    /// A worker is gone. The pool drops it silently; a bound job errors.
    fn on_worker_died(&self, worker: WorkerId, reason: &str) -> bool {
        self.pool.remove_dead(worker);
        let mut state = self.state.lock();
        let Some(&id) = state.worker_jobs.get(&worker) else { return false };
        debug!(worker = %worker, job = %id, reason, "bound worker died");
        if let Some(record) = state.jobs.get_mut(&id) {
            if record.state.is_terminal() {
                // Completion already handled; this is the death of an
                // already-released worker racing the release.
                return false;
            }
            record.set_error(WORKER_DIED);
            record.set_state(JobState::Error);
        }
        // The worker is already out of the pool; don't release it back.
        self.finish_job(&mut state, id, false, false);
        true
    }

    /// Unbind, decrement, notify, and drop the record — one critical
    /// section, so `process_queue` always observes a consistent count.
    fn finish_job(&self, state: &mut SchedState, id: JobId, success: bool, release: bool) {
        if let Some(worker) = state.bindings.remove(&id) {
            state.worker_jobs.remove(&worker);
            if release {
                self.pool.release(worker);
            }
        }
        state.running = state.running.saturating_sub(1);
        state.jobs.remove(&id);
        self.notify(SchedulerEvent::JobFinished { job: id, success });
        info!(job = %id, success, "job finished");
    }

    fn notify(&self, event: SchedulerEvent) {
        self.observers.lock().retain(|observer| observer.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
