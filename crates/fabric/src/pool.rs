// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-protocol cache of idle workers.
//!
//! One mutex guards the arena and both membership maps. Death handling
//! is idempotent and tolerates racing with a release: whichever side
//! runs second finds the worker already gone and does nothing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dfm_core::{Clock, WorkerId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::PoolError;
use crate::event::FabricEvent;
use crate::plugin::PluginRegistry;
use crate::worker::{spawn_process_worker, spawn_thread_worker, WorkerBackend, WorkerHandle};

/// How the pool builds workers.
pub(crate) struct PoolConfig {
    pub worker_bin: PathBuf,
    pub plugin_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub registry: Arc<PluginRegistry>,
    pub spawn_timeout: Duration,
    pub terminate_grace: Duration,
}

/// Counts for observers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub busy: usize,
}

#[derive(Default)]
struct PoolState {
    workers: HashMap<WorkerId, WorkerHandle>,
    /// Push-back on release, pop-back on acquire: most recently released
    /// first, favoring warm worker state.
    idle: HashMap<String, VecDeque<WorkerId>>,
    busy: HashSet<WorkerId>,
    last_idle_at: HashMap<WorkerId, Instant>,
}

pub(crate) struct WorkerPool<C: Clock> {
    state: Mutex<PoolState>,
    cfg: PoolConfig,
    events: mpsc::UnboundedSender<FabricEvent>,
    clock: C,
}

impl<C: Clock> WorkerPool<C> {
    pub fn new(cfg: PoolConfig, events: mpsc::UnboundedSender<FabricEvent>, clock: C) -> Self {
        Self { state: Mutex::new(PoolState::default()), cfg, events, clock }
    }

    /// Hand out a worker for `protocol`: most recently idled first,
    /// freshly created otherwise. The returned worker is `Busy`.
    pub async fn acquire(&self, protocol: &str) -> Result<WorkerId, PoolError> {
        {
            let mut state = self.state.lock();
            if let Some(id) = state.idle.get_mut(protocol).and_then(|deque| deque.pop_back()) {
                state.last_idle_at.remove(&id);
                state.busy.insert(id);
                if let Some(handle) = state.workers.get_mut(&id) {
                    handle.state = dfm_core::WorkerState::Busy;
                }
                debug!(worker = %id, protocol, "reusing idle worker");
                return Ok(id);
            }
        }

        // Creation happens outside the lock; only the scheduler loop
        // acquires, so no duplicate spawns race here.
        let id = WorkerId::new();
        let alive = Arc::new(AtomicBool::new(true));
        let backend = if protocol == "file" {
            WorkerBackend::Thread(spawn_thread_worker(
                id,
                protocol,
                &self.cfg.registry,
                self.events.clone(),
                Arc::clone(&alive),
            )?)
        } else {
            WorkerBackend::Process(
                spawn_process_worker(id, protocol, &self.cfg, self.events.clone(), Arc::clone(&alive))
                    .await?,
            )
        };

        let mut handle = WorkerHandle::new(id, protocol, alive, backend);
        handle.state = dfm_core::WorkerState::Busy;
        info!(worker = %id, protocol, kind = %handle.kind(), "worker created");

        let mut state = self.state.lock();
        state.workers.insert(id, handle);
        state.busy.insert(id);
        Ok(id)
    }

    /// Return a worker after its job released it. Dead workers are
    /// terminated and dropped instead of cached.
    pub fn release(&self, id: WorkerId) {
        let dead = {
            let mut state = self.state.lock();
            if !state.workers.contains_key(&id) {
                return;
            }
            state.busy.remove(&id);
            let alive = state.workers.get(&id).is_some_and(|handle| handle.is_alive());
            if alive {
                let protocol = match state.workers.get_mut(&id) {
                    Some(handle) => {
                        handle.state = dfm_core::WorkerState::Idle;
                        handle.protocol.clone()
                    }
                    None => return,
                };
                state.idle.entry(protocol).or_default().push_back(id);
                state.last_idle_at.insert(id, self.clock.now());
                None
            } else {
                state.detach(id)
            }
        };
        if let Some(mut handle) = dead {
            handle.terminate();
        }
    }

    /// Drop a worker reported dead. Idempotent; teardown runs outside
    /// the lock. Returns false if the worker was already gone.
    pub fn remove_dead(&self, id: WorkerId) -> bool {
        let handle = {
            let mut state = self.state.lock();
            state.detach(id)
        };
        match handle {
            Some(mut handle) => {
                handle.terminate();
                debug!(worker = %id, "dead worker removed from pool");
                true
            }
            None => false,
        }
    }

    /// Forward a command to a pooled worker.
    pub fn send(&self, id: WorkerId, cmd: i32, payload: Vec<u8>) -> bool {
        let state = self.state.lock();
        state.workers.get(&id).map(|handle| handle.send(cmd, payload)).unwrap_or(false)
    }

    /// Terminate idle workers older than `max_age`.
    pub fn evict_idle(&self, max_age: Duration) {
        let now = self.clock.now();
        let evicted: Vec<WorkerHandle> = {
            let mut state = self.state.lock();
            let expired: Vec<WorkerId> = state
                .last_idle_at
                .iter()
                .filter(|(_, idled_at)| now.duration_since(**idled_at) > max_age)
                .map(|(id, _)| *id)
                .collect();
            expired.into_iter().filter_map(|id| state.detach(id)).collect()
        };
        for mut handle in evicted {
            debug!(worker = %handle.id, protocol = %handle.protocol, "evicting idle worker");
            handle.terminate();
        }
    }

    /// Terminate every worker and clear the pool.
    pub fn terminate_all(&self) {
        let drained: Vec<WorkerHandle> = {
            let mut state = self.state.lock();
            state.idle.clear();
            state.busy.clear();
            state.last_idle_at.clear();
            state.workers.drain().map(|(_, handle)| handle).collect()
        };
        for mut handle in drained {
            handle.terminate();
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            total: state.workers.len(),
            idle: state.last_idle_at.len(),
            busy: state.busy.len(),
        }
    }

    /// Idle count for one protocol (test observability).
    pub fn idle_count(&self, protocol: &str) -> usize {
        let state = self.state.lock();
        state.idle.get(protocol).map(|deque| deque.len()).unwrap_or(0)
    }
}

impl PoolState {
    /// Remove a worker from every map, returning its handle.
    fn detach(&mut self, id: WorkerId) -> Option<WorkerHandle> {
        let handle = self.workers.remove(&id)?;
        self.busy.remove(&id);
        self.last_idle_at.remove(&id);
        if let Some(deque) = self.idle.get_mut(&handle.protocol) {
            deque.retain(|other| *other != id);
        }
        Some(handle)
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
