// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Round-robin fan-out across multiple workers.
//!
//! Each member is a warm-pool dispatcher for one worker. Submission rotates
//! the starting member and makes exactly one pass: busy members are skipped,
//! a transport error stops the pass (the member has already failed the run).

use super::{CompletionHook, DispatchError, Dispatcher, RunOutcome, WarmPoolDispatcher};
use async_trait::async_trait;
use smelt_core::{Clock, Pipeline, Run, RunId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct RoundRobinDispatcher<C: Clock> {
    members: Vec<Arc<WarmPoolDispatcher<C>>>,
    next: AtomicUsize,
}

impl<C: Clock> RoundRobinDispatcher<C> {
    pub fn new(members: Vec<Arc<WarmPoolDispatcher<C>>>) -> Self {
        Self { members, next: AtomicUsize::new(0) }
    }

    pub fn set_completion_hook(&self, hook: CompletionHook) {
        for member in &self.members {
            member.set_completion_hook(hook.clone());
        }
    }

    fn owner_of(&self, run_id: &RunId) -> Option<&Arc<WarmPoolDispatcher<C>>> {
        self.members.iter().find(|m| m.owns(run_id))
    }
}

#[async_trait]
impl<C: Clock> Dispatcher for RoundRobinDispatcher<C> {
    async fn submit(&self, run: &Run, pipeline: &Pipeline) -> Result<(), DispatchError> {
        if self.members.is_empty() {
            return Err(DispatchError::WorkerBusy);
        }
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.members.len() {
            let member = &self.members[(start + offset) % self.members.len()];
            match member.submit(run, pipeline).await {
                Err(DispatchError::WorkerBusy) => continue,
                other => return other,
            }
        }
        Err(DispatchError::WorkerBusy)
    }

    async fn complete(&self, run_id: &RunId, outcome: RunOutcome) -> Result<(), DispatchError> {
        // Route to the member holding the slot; an unowned run (slot lost to
        // a restart) still gets its store update through any member.
        let member = self.owner_of(run_id).or_else(|| self.members.first());
        match member {
            Some(member) => member.complete(run_id, outcome).await,
            None => Err(DispatchError::RunNotFound(*run_id)),
        }
    }

    async fn cancel(&self, run_id: &RunId) -> Result<(), DispatchError> {
        let member = self.owner_of(run_id).or_else(|| self.members.first());
        match member {
            Some(member) => member.cancel(run_id).await,
            None => Err(DispatchError::RunNotFound(*run_id)),
        }
    }

    fn drain(&self) {
        for member in &self.members {
            member.drain();
        }
    }
}

#[cfg(test)]
#[path = "round_robin_tests.rs"]
mod tests;
