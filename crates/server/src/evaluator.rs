// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger evaluator: fires pipeline runs from non-cron-schedule triggers.
//!
//! Two drivers run the same due-ness checks: a periodic tick (the
//! correctness floor) and the `run_completed` event stream (the fast path,
//! one event-delivery hop for downstream pipelines). Events are
//! at-most-once hints; anything the bus loses, the next tick recovers.

use crate::dispatch::{DispatchError, Dispatcher};
use smelt_core::{
    Clock, CronSchedule, Run, RunCompleted, RunId, RunStatus, Trigger, TriggerKind,
};
use smelt_storage::{PipelineStore, RunStore, StoreError, TriggerStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);

/// What happened when a trigger was asked to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Fired(RunId),
    /// All workers at capacity; trigger state unchanged.
    Busy,
    Cooldown,
    Disabled,
}

pub struct Evaluator<C: Clock> {
    triggers: Arc<dyn TriggerStore>,
    runs: Arc<dyn RunStore>,
    pipelines: Arc<dyn PipelineStore>,
    dispatcher: Arc<dyn Dispatcher>,
    clock: C,
    tick_interval: Duration,
}

impl<C: Clock> Evaluator<C> {
    pub fn new(
        triggers: Arc<dyn TriggerStore>,
        runs: Arc<dyn RunStore>,
        pipelines: Arc<dyn PipelineStore>,
        dispatcher: Arc<dyn Dispatcher>,
        clock: C,
    ) -> Self {
        Self {
            triggers,
            runs,
            pipelines,
            dispatcher,
            clock,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Drive both evaluation paths until cancelled.
    pub async fn run(
        self: Arc<Self>,
        cancel: CancellationToken,
        mut events: mpsc::Receiver<RunCompleted>,
    ) {
        tracing::info!(interval = ?self.tick_interval, "trigger evaluator started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("trigger evaluator stopped");
                    return;
                }
                _ = tokio::time::sleep(self.tick_interval) => {
                    self.tick().await;
                }
                event = events.recv() => match event {
                    Some(event) => self.on_run_completed(&event).await,
                    // Sender gone; the tick keeps the evaluator correct.
                    None => tokio::time::sleep(self.tick_interval).await,
                }
            }
        }
    }

    /// Periodic pass over the polled trigger kinds (cron, cron_dependency).
    pub async fn tick(&self) {
        for kind in [TriggerKind::Cron, TriggerKind::CronDependency] {
            let triggers = match self.triggers.list_enabled_by_kind(kind).await {
                Ok(triggers) => triggers,
                Err(error) => {
                    tracing::warn!(%kind, %error, "evaluator failed to list triggers");
                    continue;
                }
            };
            for trigger in triggers {
                if let Err(error) = self.evaluate_polled(&trigger).await {
                    tracing::warn!(trigger = %trigger.id, %error, "trigger evaluation failed");
                }
            }
        }
    }

    /// Event path: react to an upstream success within one delivery hop
    /// instead of waiting out the tick interval. `pipeline_success`
    /// triggers fire here as well as from the API completion path; the
    /// cooldown dedupes the overlap.
    pub async fn on_run_completed(&self, event: &RunCompleted) {
        if event.status != RunStatus::Success {
            return;
        }

        if let Ok(triggers) =
            self.triggers.list_enabled_by_kind(TriggerKind::CronDependency).await
        {
            for trigger in triggers {
                if let Err(error) = self.evaluate_polled(&trigger).await {
                    tracing::warn!(trigger = %trigger.id, %error, "event re-evaluation failed");
                }
            }
        }

        let Ok(Some(pipeline)) = self.pipelines.get(&event.pipeline_id).await else {
            return;
        };
        let completed_ref = pipeline.reference();
        if let Ok(triggers) =
            self.triggers.list_enabled_by_kind(TriggerKind::PipelineSuccess).await
        {
            for trigger in triggers {
                if !trigger.config.upstreams().contains(&completed_ref) {
                    continue;
                }
                if trigger.in_cooldown(self.clock.now_utc()) {
                    continue;
                }
                if let Err(error) = self.fire(&trigger).await {
                    tracing::warn!(trigger = %trigger.id, %error, "pipeline_success firing failed");
                }
            }
        }
    }

    /// Externally-driven firing (webhook, API). Checks enablement and
    /// cooldown, then fires.
    pub async fn fire_external(&self, trigger: &Trigger) -> Result<FireOutcome, StoreError> {
        if !trigger.enabled {
            return Ok(FireOutcome::Disabled);
        }
        if trigger.in_cooldown(self.clock.now_utc()) {
            return Ok(FireOutcome::Cooldown);
        }
        self.fire(trigger).await
    }

    /// File arrival: fires landing_zone_upload triggers for the zone and
    /// file_pattern triggers whose glob matches the path.
    pub async fn on_file_uploaded(
        &self,
        zone: &str,
        path: &str,
    ) -> Result<Vec<RunId>, StoreError> {
        let mut fired = Vec::new();
        let now = self.clock.now_utc();

        for trigger in
            self.triggers.list_enabled_by_kind(TriggerKind::LandingZoneUpload).await?
        {
            if trigger.config.zone() != Some(zone) || trigger.in_cooldown(now) {
                continue;
            }
            if let FireOutcome::Fired(run_id) = self.fire(&trigger).await? {
                fired.push(run_id);
            }
        }

        for trigger in self.triggers.list_enabled_by_kind(TriggerKind::FilePattern).await? {
            if trigger.config.zone() != Some(zone) || trigger.in_cooldown(now) {
                continue;
            }
            let matches = trigger
                .config
                .pattern()
                .and_then(|pattern| globset::Glob::new(pattern).ok())
                .map(|glob| glob.compile_matcher().is_match(path))
                .unwrap_or(false);
            if !matches {
                continue;
            }
            if let FireOutcome::Fired(run_id) = self.fire(&trigger).await? {
                fired.push(run_id);
            }
        }

        Ok(fired)
    }

    async fn evaluate_polled(&self, trigger: &Trigger) -> Result<(), StoreError> {
        let now = self.clock.now_utc();

        let Some(expr) = trigger.config.cron() else {
            tracing::warn!(trigger = %trigger.id, "trigger has no cron expression");
            return Ok(());
        };
        let cron = match CronSchedule::parse(expr) {
            Ok(cron) => cron,
            Err(error) => {
                tracing::warn!(trigger = %trigger.id, %error, "skipping unparseable cron");
                return Ok(());
            }
        };

        // First sighting: the first firing lands on the next tick past
        // cron.next(now).
        let Some(last) = trigger.last_triggered_at else {
            self.triggers.touch(&trigger.id, now).await?;
            return Ok(());
        };

        if trigger.in_cooldown(now) || !cron.due_since(last, now) {
            return Ok(());
        }

        if trigger.kind == TriggerKind::CronDependency {
            // A dependency trigger with nothing listed never fires.
            let upstreams = trigger.config.upstreams();
            if upstreams.is_empty() {
                return Ok(());
            }
            let mut has_new_data = false;
            for reference in &upstreams {
                let Some(upstream) = self.pipelines.get_by_ref(reference).await? else {
                    continue;
                };
                if self.runs.has_success_since(&upstream.id, Some(last)).await? {
                    has_new_data = true;
                    break;
                }
            }
            // No upstream produced since we last fired: skip without
            // advancing so the data, when it lands, still counts as new.
            if !has_new_data {
                return Ok(());
            }
        }

        self.fire(trigger).await?;
        Ok(())
    }

    async fn fire(&self, trigger: &Trigger) -> Result<FireOutcome, StoreError> {
        let now = self.clock.now_utc();
        let Some(pipeline) = self.pipelines.get(&trigger.pipeline_id).await? else {
            tracing::warn!(trigger = %trigger.id, "trigger points at a missing pipeline");
            return Ok(FireOutcome::Disabled);
        };

        let run = Run::new(RunId::new(), trigger.pipeline_id, trigger.label(), now);
        self.runs.create(&run).await?;

        match self.dispatcher.submit(&run, &pipeline).await {
            Ok(()) => {}
            // Back-pressure: the firing does not count; the pending run
            // waits for capacity and the trigger will re-fire checks later.
            Err(DispatchError::WorkerBusy) => return Ok(FireOutcome::Busy),
            // Other dispatch errors count as the firing.
            Err(error) => {
                tracing::warn!(trigger = %trigger.id, run = %run.id, %error, "dispatch failed");
            }
        }

        self.triggers.record_fired(&trigger.id, &run.id, self.clock.now_utc()).await?;
        Ok(FireOutcome::Fired(run.id))
    }
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;
