// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run records and the run state machine.
//!
//! ```text
//! pending ──dispatched──► running ──success──► success   (terminal)
//!     │                      │
//!     │                      ├──fail────────► failed     (terminal)
//!     │                      └──cancel──────► cancelled  (terminal)
//!     ├──cancel──────────────────────────────► cancelled (terminal)
//!     └──stuck-timeout───────────────────────► failed    (terminal)
//! ```
//!
//! Once terminal, a run's status never changes again. `started_at` is set on
//! the first transition into running; `finished_at` on entry to any terminal
//! status, and never cleared.

use crate::{PipelineId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed | RunStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether the state machine permits `self → to`.
    pub fn can_transition_to(&self, to: RunStatus) -> bool {
        match (self, to) {
            (RunStatus::Pending, RunStatus::Running) => true,
            // Direct pending → failed covers the reaper's stuck-timeout.
            (RunStatus::Pending, RunStatus::Failed) => true,
            (RunStatus::Pending, RunStatus::Cancelled) => true,
            (RunStatus::Running, RunStatus::Success) => true,
            (RunStatus::Running, RunStatus::Failed) => true,
            (RunStatus::Running, RunStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal run transition {from} → {to}")]
pub struct TransitionError {
    pub from: RunStatus,
    pub to: RunStatus,
}

/// A single execution of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub pipeline_id: PipelineId,
    pub status: RunStatus,
    /// Free-form description of what fired the run, e.g. `schedule:0 * * * *`
    /// or `trigger:webhook:deploy-hook`.
    pub trigger: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub rows_written: Option<i64>,
    pub error: Option<String>,
    /// Pointer to archived logs in the object store, if any.
    pub log_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Run {
    pub fn new(
        id: RunId,
        pipeline_id: PipelineId,
        trigger: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            pipeline_id,
            status: RunStatus::Pending,
            trigger: trigger.into(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            rows_written: None,
            error: None,
            log_path: None,
            created_at,
        }
    }

    /// Apply a status transition, maintaining the timestamp invariants.
    /// Rejects transitions the state machine forbids.
    pub fn transition(&mut self, to: RunStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError { from: self.status, to });
        }
        if to == RunStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.finished_at = Some(now);
            if self.duration_ms.is_none() {
                if let Some(started) = self.started_at {
                    self.duration_ms = Some((now - started).num_milliseconds().max(0));
                }
            }
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
