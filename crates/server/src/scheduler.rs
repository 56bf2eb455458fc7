// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron scheduler: fires pipeline runs at their due times, at most once
//! per firing, without piling up backlog when workers are slow.
//!
//! Catch-up-once: the next fire time is always computed from *now*, never
//! from the previous `next_run_at`, so a schedule missed for three hours
//! fires once, not three times.

use crate::dispatch::{DispatchError, Dispatcher};
use smelt_core::{Clock, CronSchedule, Pipeline, Run, RunId, Schedule};
use smelt_storage::{PipelineStore, RunStore, ScheduleStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);

pub struct Scheduler<C: Clock> {
    schedules: Arc<dyn ScheduleStore>,
    runs: Arc<dyn RunStore>,
    pipelines: Arc<dyn PipelineStore>,
    dispatcher: Arc<dyn Dispatcher>,
    clock: C,
    tick_interval: Duration,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        runs: Arc<dyn RunStore>,
        pipelines: Arc<dyn PipelineStore>,
        dispatcher: Arc<dyn Dispatcher>,
        clock: C,
    ) -> Self {
        Self {
            schedules,
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

    /// Tick loop; cross-replica exclusivity comes from leader election,
    /// not from anything in here.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(interval = ?self.tick_interval, "scheduler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(self.tick_interval) => {
                    self.tick().await;
                }
            }
        }
    }

    /// One pass over every enabled schedule, sequentially in list order.
    pub async fn tick(&self) {
        let schedules = match self.schedules.list_enabled().await {
            Ok(schedules) => schedules,
            Err(error) => {
                tracing::warn!(%error, "scheduler failed to list schedules");
                return;
            }
        };

        for schedule in schedules {
            if let Err(error) = self.evaluate(&schedule).await {
                tracing::warn!(schedule = %schedule.id, %error, "schedule evaluation failed");
            }
        }
    }

    async fn evaluate(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let now = self.clock.now_utc();

        // Invalid-input class: log, skip, never fatal.
        let cron = match CronSchedule::parse(&schedule.cron) {
            Ok(cron) => cron,
            Err(error) => {
                tracing::warn!(schedule = %schedule.id, %error, "skipping unparseable cron");
                return Ok(());
            }
        };
        let Some(next_from_now) = cron.next_after(now) else {
            tracing::warn!(schedule = %schedule.id, cron = %schedule.cron, "cron never fires again");
            return Ok(());
        };

        // First sighting: initialize next_run_at, fire on a later tick.
        let Some(next_run_at) = schedule.next_run_at else {
            self.schedules.set_next_run(&schedule.id, next_from_now).await?;
            return Ok(());
        };

        if next_run_at > now {
            return Ok(());
        }

        let Some(pipeline) = self.pipelines.get(&schedule.pipeline_id).await? else {
            tracing::warn!(schedule = %schedule.id, "schedule points at a missing pipeline");
            return Ok(());
        };

        // Active-run skip: never stack a second run on a busy pipeline.
        // A still-pending run from an earlier worker-busy tick gets its
        // admission retried instead; a running run means wait.
        if let Some(active) = self.runs.active_run(&schedule.pipeline_id).await? {
            if active.status == smelt_core::RunStatus::Pending {
                self.submit_and_advance(schedule, &active, &pipeline, &cron).await?;
            }
            return Ok(());
        }

        let run = Run::new(
            RunId::new(),
            schedule.pipeline_id,
            format!("schedule:{}", schedule.cron),
            now,
        );
        self.runs.create(&run).await?;
        self.submit_and_advance(schedule, &run, &pipeline, &cron).await?;
        Ok(())
    }

    async fn submit_and_advance(
        &self,
        schedule: &Schedule,
        run: &Run,
        pipeline: &Pipeline,
        cron: &CronSchedule,
    ) -> Result<(), StoreError> {
        match self.dispatcher.submit(run, pipeline).await {
            Ok(()) => {}
            // Back-pressure: the run stays pending and the schedule does
            // not advance, so the next tick retries admission.
            Err(DispatchError::WorkerBusy) => return Ok(()),
            // Any other dispatch error counts as the firing; retrying is a
            // user action on the failed run.
            Err(error) => {
                tracing::warn!(schedule = %schedule.id, run = %run.id, %error, "dispatch failed");
            }
        }

        let now = self.clock.now_utc();
        if let Some(next) = cron.next_after(now) {
            self.schedules.record_fired(&schedule.id, &run.id, now, next).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
