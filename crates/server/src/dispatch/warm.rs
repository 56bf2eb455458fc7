// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warm-pool dispatcher for a single worker.

use super::{CompletionHook, DispatchError, Dispatcher, RunOutcome};
use crate::object_store::pipeline_source_prefix;
use crate::worker::{DispatchReply, DispatchRequest, WorkerClient};
use async_trait::async_trait;
use parking_lot::Mutex;
use smelt_core::{Clock, Pipeline, Run, RunId, RunStatus};
use smelt_storage::{RunStore, RunUpdate, StoreError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

pub struct WarmPoolDispatcher<C: Clock> {
    worker: Arc<dyn WorkerClient>,
    runs: Arc<dyn RunStore>,
    clock: C,
    /// Currently reserved slots; the compare-and-swap on this counter is
    /// the admission linearization point.
    slots: AtomicU32,
    assigned: Mutex<HashSet<RunId>>,
    hook: Mutex<Option<CompletionHook>>,
    draining: AtomicBool,
}

impl<C: Clock> WarmPoolDispatcher<C> {
    pub fn new(worker: Arc<dyn WorkerClient>, runs: Arc<dyn RunStore>, clock: C) -> Self {
        Self {
            worker,
            runs,
            clock,
            slots: AtomicU32::new(0),
            assigned: Mutex::new(HashSet::new()),
            hook: Mutex::new(None),
            draining: AtomicBool::new(false),
        }
    }

    pub fn set_completion_hook(&self, hook: CompletionHook) {
        *self.hook.lock() = Some(hook);
    }

    /// Whether this dispatcher holds the slot for `run_id`.
    pub fn owns(&self, run_id: &RunId) -> bool {
        self.assigned.lock().contains(run_id)
    }

    pub fn in_flight(&self) -> u32 {
        self.slots.load(Ordering::SeqCst)
    }

    /// Reserve one slot, bounded by the worker's advertised capacity.
    fn try_reserve(&self) -> bool {
        let capacity = self.worker.capacity();
        loop {
            let current = self.slots.load(Ordering::SeqCst);
            if current >= capacity {
                return false;
            }
            if self
                .slots
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release(&self, run_id: Option<&RunId>) {
        if let Some(run_id) = run_id {
            self.assigned.lock().remove(run_id);
        }
        // Never underflow: a release without a reservation is a bug upstream.
        let _ = self
            .slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
    }

    fn fire_hook(&self, run: &Run) {
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(run);
        }
    }
}

#[async_trait]
impl<C: Clock> Dispatcher for WarmPoolDispatcher<C> {
    async fn submit(&self, run: &Run, pipeline: &Pipeline) -> Result<(), DispatchError> {
        if self.draining.load(Ordering::SeqCst) {
            return Err(DispatchError::WorkerBusy);
        }
        if !self.try_reserve() {
            return Err(DispatchError::WorkerBusy);
        }

        // Slot reserved: the run leaves pending before the worker call so a
        // crash between the two shows up as a stuck run, not a lost slot.
        let running = self
            .runs
            .update_status(&run.id, RunUpdate::to(RunStatus::Running), self.clock.now_utc())
            .await;
        match running {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.release(None);
                return Err(DispatchError::RunNotFound(run.id));
            }
            Err(error) => {
                self.release(None);
                return Err(error.into());
            }
        }

        let request = DispatchRequest {
            run_id: run.id,
            pipeline: pipeline.reference(),
            code_refs: vec![pipeline_source_prefix(&pipeline.reference())],
        };

        match self.worker.dispatch(&request).await {
            Ok(DispatchReply::Accepted) => {
                self.assigned.lock().insert(run.id);
                Ok(())
            }
            // The reservation is the admission gate; a busy reply past it
            // means the worker lost slots out from under us. Treated like a
            // failed dispatch: no retry here, callers see the error.
            Ok(DispatchReply::WorkerBusy) => {
                self.release(None);
                let message = "worker refused dispatch: busy".to_string();
                self.fail_run(&run.id, &message).await;
                Err(DispatchError::Transport(message))
            }
            Err(error) => {
                self.release(None);
                let message = error.to_string();
                self.fail_run(&run.id, &message).await;
                Err(DispatchError::Transport(message))
            }
        }
    }

    async fn complete(&self, run_id: &RunId, outcome: RunOutcome) -> Result<(), DispatchError> {
        if !outcome.status.is_terminal() {
            return Err(DispatchError::NotTerminal(outcome.status));
        }

        let update = RunUpdate {
            status: outcome.status,
            error: outcome.error,
            duration_ms: outcome.duration_ms,
            rows_written: outcome.rows_written,
            log_path: outcome.log_path,
        };
        let updated = self.runs.update_status(run_id, update, self.clock.now_utc()).await;

        let run = match updated {
            Ok(Some(run)) => Some(run),
            Ok(None) => None,
            // Duplicate completion: the run is already terminal. The hook is
            // idempotent, so release the slot and succeed.
            Err(StoreError::IllegalTransition(_)) => None,
            Err(error) => {
                self.release(Some(run_id));
                return Err(error.into());
            }
        };

        if self.owns(run_id) {
            self.release(Some(run_id));
        }

        match run {
            Some(run) => {
                self.fire_hook(&run);
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn cancel(&self, run_id: &RunId) -> Result<(), DispatchError> {
        let run = self
            .runs
            .get(run_id)
            .await?
            .ok_or(DispatchError::RunNotFound(*run_id))?;

        match run.status {
            RunStatus::Pending => {
                let updated = self
                    .runs
                    .update_status(
                        run_id,
                        RunUpdate::to(RunStatus::Cancelled),
                        self.clock.now_utc(),
                    )
                    .await?;
                if let Some(run) = updated {
                    self.fire_hook(&run);
                }
                Ok(())
            }
            RunStatus::Running => {
                // The worker drives the terminal transition via complete().
                self.worker
                    .cancel(run_id)
                    .await
                    .map_err(|e| DispatchError::Transport(e.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }
}

impl<C: Clock> WarmPoolDispatcher<C> {
    /// Transport failures mid-submit fail the run rather than retrying:
    /// a duplicate dispatch is worse than a failed run the operator can
    /// re-submit.
    async fn fail_run(&self, run_id: &RunId, message: &str) {
        let failed = self
            .runs
            .update_status(run_id, RunUpdate::failed(message), self.clock.now_utc())
            .await;
        match failed {
            Ok(Some(run)) => self.fire_hook(&run),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(run = %run_id, %error, "failed to record dispatch failure");
            }
        }
    }
}

#[cfg(test)]
#[path = "warm_tests.rs"]
mod tests;
