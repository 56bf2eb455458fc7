// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor dispatcher: admission control and run delivery.
//!
//! Worker-busy is not a failure. It is the back-pressure signal that keeps
//! the scheduler and evaluator from advancing state while workers are
//! saturated, and it must never mutate a run.

mod round_robin;
mod warm;

pub use round_robin::RoundRobinDispatcher;
pub use warm::WarmPoolDispatcher;

use async_trait::async_trait;
use smelt_core::{Pipeline, Run, RunId, RunStatus};
use smelt_storage::StoreError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The chosen worker (or every worker, for round robin) is at capacity.
    /// Callers back off; this is never surfaced to end users.
    #[error("worker busy")]
    WorkerBusy,

    #[error("run {0} not found")]
    RunNotFound(RunId),

    /// Completion reported a non-terminal status.
    #[error("invalid completion status {0}")]
    NotTerminal(RunStatus),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("dispatch transport failure: {0}")]
    Transport(String),
}

/// Terminal outcome reported by a worker.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub duration_ms: Option<i64>,
    pub rows_written: Option<i64>,
    pub error: Option<String>,
    pub log_path: Option<String>,
}

impl RunOutcome {
    pub fn success() -> Self {
        Self {
            status: RunStatus::Success,
            duration_ms: None,
            rows_written: None,
            error: None,
            log_path: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { status: RunStatus::Failed, error: Some(error.into()), ..Self::success() }
    }
}

/// Invoked after every terminal transition the dispatcher records. Must be
/// idempotent and must not block.
pub type CompletionHook = Arc<dyn Fn(&Run) + Send + Sync>;

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Deliver a pending run to a worker under admission control.
    ///
    /// `Err(WorkerBusy)` means no slot was available and nothing was
    /// mutated; the caller decides whether to retry later.
    async fn submit(&self, run: &Run, pipeline: &Pipeline) -> Result<(), DispatchError>;

    /// Record a worker-reported terminal outcome, release the slot, and
    /// fire the completion hook.
    async fn complete(&self, run_id: &RunId, outcome: RunOutcome) -> Result<(), DispatchError>;

    /// Cancel: pending runs flip to cancelled in the store; running runs
    /// get a worker cancel and the worker drives the terminal transition.
    async fn cancel(&self, run_id: &RunId) -> Result<(), DispatchError>;

    /// Stop accepting new submissions (shutdown drain).
    fn drain(&self);
}
