// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job records and the handle callers observe them through.

use dfm_core::{JobId, JobSpec, JobState, WorkerId};
use tokio::sync::mpsc;

/// Observations delivered to a job's owner, in order.
///
/// `Started` always precedes any `Progress`/`Data`; a terminal
/// `Finished` is delivered exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Started,
    StateChanged(JobState),
    Progress(i32),
    /// Intermediate (`DATA`) or final (`RESULT`) artifact bytes.
    Data(Vec<u8>),
    ErrorChanged(String),
    Finished { success: bool },
}

/// Caller's view of a scheduled job.
pub struct JobHandle {
    pub id: JobId,
    pub events: mpsc::UnboundedReceiver<JobEvent>,
}

impl JobHandle {
    /// Drain events until the terminal `Finished`, returning everything
    /// observed. Convenience for sequential callers and tests.
    pub async fn wait(&mut self) -> Vec<JobEvent> {
        let mut seen = Vec::new();
        while let Some(event) = self.events.recv().await {
            let done = matches!(event, JobEvent::Finished { .. });
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    }
}

/// Scheduler-owned state for one job.
pub(crate) struct JobRecord {
    pub spec: JobSpec,
    pub state: JobState,
    pub progress: i32,
    pub error: Option<String>,
    pub worker: Option<WorkerId>,
    events: mpsc::UnboundedSender<JobEvent>,
}

impl JobRecord {
    pub fn new(spec: JobSpec) -> (Self, JobHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = spec.id;
        let record = Self {
            spec,
            state: JobState::None,
            progress: 0,
            error: None,
            worker: None,
            events: tx,
        };
        (record, JobHandle { id, events: rx })
    }

    /// The single state mutator. Emits `StateChanged`, and `Finished` on
    /// entry into a terminal state.
    pub fn set_state(&mut self, state: JobState) {
        if self.state == state {
            return;
        }
        self.state = state;
        let _ = self.events.send(JobEvent::StateChanged(state));
        if state.is_terminal() {
            let _ = self.events.send(JobEvent::Finished { success: state.succeeded() });
        }
    }

    /// Monotonic progress: regressions are ignored, values clamp to 100.
    pub fn set_progress(&mut self, percent: i32) {
        let percent = percent.min(100);
        if percent > self.progress {
            self.progress = percent;
            let _ = self.events.send(JobEvent::Progress(percent));
        }
    }

    pub fn set_error(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        let _ = self.events.send(JobEvent::ErrorChanged(reason.clone()));
        self.error = Some(reason);
    }

    pub fn emit_started(&self) {
        let _ = self.events.send(JobEvent::Started);
    }

    pub fn emit_data(&self, bytes: Vec<u8>) {
        let _ = self.events.send(JobEvent::Data(bytes));
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
