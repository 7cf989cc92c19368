// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier, state machine, and submission spec.

use serde::{Deserialize, Serialize};
use url::Url;

crate::define_id! {
    /// Unique identifier for a job instance.
    ///
    /// Each submitted job gets a unique ID used to track its state,
    /// resolve its worker binding, and reference it in logs and events.
    pub struct JobId("job-");
}

/// Job lifecycle states.
///
/// ```text
/// None → Starting → Running ⇄ Paused → {Finished | Error | Canceled}
/// ```
///
/// `Finished`, `Error`, and `Canceled` are terminal; a job is destroyed
/// only after reaching one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    None,
    Starting,
    Running,
    Paused,
    Finished,
    Error,
    Canceled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished | JobState::Error | JobState::Canceled)
    }

    /// Terminal-with-success. Only `Finished` counts.
    pub fn succeeded(self) -> bool {
        self == JobState::Finished
    }

    /// Only `Running` or `Paused` jobs may be cancelled.
    pub fn can_cancel(self) -> bool {
        matches!(self, JobState::Running | JobState::Paused)
    }

    pub fn can_pause(self) -> bool {
        self == JobState::Running
    }

    pub fn can_resume(self) -> bool {
        self == JobState::Paused
    }
}

crate::simple_display! {
    JobState {
        None => "none",
        Starting => "starting",
        Running => "running",
        Paused => "paused",
        Finished => "finished",
        Error => "error",
        Canceled => "canceled",
    }
}

/// Extract the protocol scheme from a URL (`file:///x` → `file`).
pub fn scheme_of(url: &Url) -> &str {
    url.scheme()
}

/// What a caller submits to the scheduler.
///
/// URL-scoped jobs are dispatched to a worker for the URL's scheme; jobs
/// without a URL run no worker command but still count against the
/// concurrency cap.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: JobId,
    /// Target resource; `None` for jobs that manage their own execution.
    pub url: Option<Url>,
    /// Task command code sent to the worker on start (`100..=199`).
    pub command: i32,
    /// Opaque task payload forwarded with the start command.
    pub payload: Vec<u8>,
}

impl JobSpec {
    /// A job targeting `url`, started with the given task command.
    pub fn for_url(url: Url, command: i32, payload: Vec<u8>) -> Self {
        Self { id: JobId::new(), url: Some(url), command, payload }
    }

    /// A job with no worker target.
    pub fn detached() -> Self {
        Self { id: JobId::new(), url: None, command: crate::command::NONE, payload: Vec::new() }
    }

    /// Protocol scheme of the target URL, if any.
    pub fn protocol(&self) -> Option<&str> {
        self.url.as_ref().map(scheme_of)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
