// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory implementations of every store trait, for component tests.
//!
//! One [`MemStore`] implements all the traits over shared maps, so tests
//! wire a single value everywhere a store is needed. Terminal run
//! transitions are forwarded to an optional sink, standing in for the
//! `run_completed` notification channel.

use crate::zones::{LandingFile, LandingZone};
use crate::{
    AuditStore, LandingZoneStore, PipelineStore, ReaperStatusStore, RunStore, RunUpdate,
    ScheduleStore, SettingsStore, StoreError, SweepStatus, TriggerStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use smelt_core::{
    Pipeline, PipelineId, PipelineRef, Run, RunCompleted, RunId, Schedule, ScheduleId, Trigger,
    TriggerId, TriggerKind, ZoneId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Default)]
struct State {
    pipelines: HashMap<String, Pipeline>,
    runs: HashMap<String, Run>,
    schedules: HashMap<String, Schedule>,
    triggers: HashMap<String, Trigger>,
    settings: HashMap<String, String>,
    audit: Vec<(String, String, DateTime<Utc>)>,
    zones: Vec<LandingZone>,
    files: Vec<LandingFile>,
    sweep: Option<SweepStatus>,
    completed_sink: Option<UnboundedSender<RunCompleted>>,
}

/// All stores in one value; clones share state.
#[derive(Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<State>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route terminal-transition events into a channel, the way the real
    /// run store publishes `run_completed`.
    pub fn set_completed_sink(&self, tx: UnboundedSender<RunCompleted>) {
        self.state.lock().completed_sink = Some(tx);
    }

    pub fn insert_pipeline(&self, pipeline: Pipeline) {
        self.state.lock().pipelines.insert(pipeline.id.to_string(), pipeline);
    }

    pub fn insert_run(&self, run: Run) {
        self.state.lock().runs.insert(run.id.to_string(), run);
    }

    pub fn insert_schedule(&self, schedule: Schedule) {
        self.state.lock().schedules.insert(schedule.id.to_string(), schedule);
    }

    pub fn insert_trigger(&self, trigger: Trigger) {
        self.state.lock().triggers.insert(trigger.id.to_string(), trigger);
    }

    pub fn insert_zone(&self, zone: LandingZone) {
        self.state.lock().zones.push(zone);
    }

    pub fn insert_file(&self, file: LandingFile) {
        self.state.lock().files.push(file);
    }

    pub fn all_runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.state.lock().runs.values().cloned().collect();
        runs.sort_by_key(|r| r.created_at);
        runs
    }

    pub fn run_count(&self) -> usize {
        self.state.lock().runs.len()
    }

    pub fn schedule(&self, id: &ScheduleId) -> Option<Schedule> {
        self.state.lock().schedules.get(id.as_str()).cloned()
    }

    pub fn trigger(&self, id: &TriggerId) -> Option<Trigger> {
        self.state.lock().triggers.get(id.as_str()).cloned()
    }

    pub fn audit_len(&self) -> usize {
        self.state.lock().audit.len()
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().files.len()
    }
}

#[async_trait]
impl PipelineStore for MemStore {
    async fn get(&self, id: &PipelineId) -> Result<Option<Pipeline>, StoreError> {
        Ok(self.state.lock().pipelines.get(id.as_str()).cloned())
    }

    async fn get_by_ref(&self, reference: &PipelineRef) -> Result<Option<Pipeline>, StoreError> {
        Ok(self
            .state
            .lock()
            .pipelines
            .values()
            .find(|p| p.deleted_at.is_none() && &p.reference() == reference)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Pipeline>, StoreError> {
        let mut pipelines: Vec<Pipeline> =
            self.state.lock().pipelines.values().filter(|p| p.deleted_at.is_none()).cloned().collect();
        pipelines.sort_by_key(|p| p.reference().to_string());
        Ok(pipelines)
    }

    async fn list_deleted_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Pipeline>, StoreError> {
        Ok(self
            .state
            .lock()
            .pipelines
            .values()
            .filter(|p| matches!(p.deleted_at, Some(at) if at < cutoff))
            .cloned()
            .collect())
    }

    async fn hard_delete(&self, id: &PipelineId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.pipelines.remove(id.as_str());
        // Cascade the way the schema does.
        state.runs.retain(|_, r| r.pipeline_id != *id);
        state.schedules.retain(|_, s| s.pipeline_id != *id);
        state.triggers.retain(|_, t| t.pipeline_id != *id);
        Ok(())
    }
}

#[async_trait]
impl RunStore for MemStore {
    async fn create(&self, run: &Run) -> Result<(), StoreError> {
        self.state.lock().runs.insert(run.id.to_string(), run.clone());
        Ok(())
    }

    async fn get(&self, id: &RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.state.lock().runs.get(id.as_str()).cloned())
    }

    async fn active_run(&self, pipeline_id: &PipelineId) -> Result<Option<Run>, StoreError> {
        Ok(self
            .state
            .lock()
            .runs
            .values()
            .filter(|r| r.pipeline_id == *pipeline_id && !r.status.is_terminal())
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn has_success_since(
        &self,
        pipeline_id: &PipelineId,
        after: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        Ok(self.state.lock().runs.values().any(|r| {
            r.pipeline_id == *pipeline_id
                && r.status == smelt_core::RunStatus::Success
                && match (after, r.finished_at) {
                    (None, _) => true,
                    (Some(after), Some(finished)) => finished > after,
                    (Some(_), None) => false,
                }
        }))
    }

    async fn update_status(
        &self,
        id: &RunId,
        update: RunUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Run>, StoreError> {
        let (run, sink) = {
            let mut state = self.state.lock();
            let Some(run) = state.runs.get_mut(id.as_str()) else {
                return Ok(None);
            };
            run.transition(update.status, now)?;
            if update.error.is_some() {
                run.error = update.error;
            }
            if update.duration_ms.is_some() {
                run.duration_ms = update.duration_ms;
            }
            if update.rows_written.is_some() {
                run.rows_written = update.rows_written;
            }
            if update.log_path.is_some() {
                run.log_path = update.log_path;
            }
            (run.clone(), state.completed_sink.clone())
        };

        if run.status.is_terminal() {
            if let Some(tx) = sink {
                let _ = tx.send(RunCompleted {
                    run_id: run.id,
                    pipeline_id: run.pipeline_id,
                    status: run.status,
                });
            }
        }
        Ok(Some(run))
    }

    async fn list_for_pipeline(
        &self,
        pipeline_id: &PipelineId,
        limit: i64,
    ) -> Result<Vec<Run>, StoreError> {
        let mut runs: Vec<Run> = self
            .state
            .lock()
            .runs
            .values()
            .filter(|r| r.pipeline_id == *pipeline_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }

    async fn prune_keep_newest(
        &self,
        pipeline_id: &PipelineId,
        keep: i64,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock();
        let mut all: Vec<(String, DateTime<Utc>)> = state
            .runs
            .iter()
            .filter(|(_, r)| r.pipeline_id == *pipeline_id)
            .map(|(k, r)| (k.clone(), r.created_at))
            .collect();
        all.sort_by(|a, b| b.1.cmp(&a.1));
        let mut deleted = 0;
        for (key, _) in all.into_iter().skip(keep.max(0) as usize) {
            // Non-terminal runs are always preserved.
            let terminal = state.runs.get(&key).map(|r| r.status.is_terminal()).unwrap_or(false);
            if terminal {
                state.runs.remove(&key);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock();
        let before = state.runs.len();
        state.runs.retain(|_, r| !(r.status.is_terminal() && r.created_at < cutoff));
        Ok((before - state.runs.len()) as u64)
    }

    async fn prune_older_than_for(
        &self,
        pipeline_id: &PipelineId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock();
        let before = state.runs.len();
        state.runs.retain(|_, r| {
            !(r.pipeline_id == *pipeline_id && r.status.is_terminal() && r.created_at < cutoff)
        });
        Ok((before - state.runs.len()) as u64)
    }

    async fn list_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<Run>, StoreError> {
        Ok(self
            .state
            .lock()
            .runs
            .values()
            .filter(|r| !r.status.is_terminal() && r.created_at < cutoff)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ScheduleStore for MemStore {
    async fn list_enabled(&self) -> Result<Vec<Schedule>, StoreError> {
        let mut schedules: Vec<Schedule> =
            self.state.lock().schedules.values().filter(|s| s.enabled).cloned().collect();
        schedules.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(schedules)
    }

    async fn set_next_run(&self, id: &ScheduleId, next: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(schedule) = self.state.lock().schedules.get_mut(id.as_str()) {
            schedule.next_run_at = Some(next);
        }
        Ok(())
    }

    async fn record_fired(
        &self,
        id: &ScheduleId,
        run_id: &RunId,
        at: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(schedule) = self.state.lock().schedules.get_mut(id.as_str()) {
            schedule.last_run_id = Some(*run_id);
            schedule.last_run_at = Some(at);
            schedule.next_run_at = Some(next);
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerStore for MemStore {
    async fn get(&self, id: &TriggerId) -> Result<Option<Trigger>, StoreError> {
        Ok(self.state.lock().triggers.get(id.as_str()).cloned())
    }

    async fn list_enabled(&self) -> Result<Vec<Trigger>, StoreError> {
        let mut triggers: Vec<Trigger> =
            self.state.lock().triggers.values().filter(|t| t.enabled).cloned().collect();
        triggers.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(triggers)
    }

    async fn list_enabled_by_kind(&self, kind: TriggerKind) -> Result<Vec<Trigger>, StoreError> {
        Ok(TriggerStore::list_enabled(self).await?.into_iter().filter(|t| t.kind == kind).collect())
    }

    async fn record_fired(
        &self,
        id: &TriggerId,
        run_id: &RunId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(trigger) = self.state.lock().triggers.get_mut(id.as_str()) {
            let stale = matches!(trigger.last_triggered_at, Some(last) if last >= at);
            if !stale {
                trigger.last_run_id = Some(*run_id);
                trigger.last_triggered_at = Some(at);
            }
        }
        Ok(())
    }

    async fn touch(&self, id: &TriggerId, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(trigger) = self.state.lock().triggers.get_mut(id.as_str()) {
            let stale = matches!(trigger.last_triggered_at, Some(last) if last >= at);
            if !stale {
                trigger.last_triggered_at = Some(at);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().settings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.state.lock().settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemStore {
    async fn append(
        &self,
        action: &str,
        detail: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.state.lock().audit.push((action.to_string(), detail.to_string(), at));
        Ok(())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock();
        let before = state.audit.len();
        state.audit.retain(|(_, _, at)| *at >= cutoff);
        Ok((before - state.audit.len()) as u64)
    }
}

#[async_trait]
impl LandingZoneStore for MemStore {
    async fn list_zones(&self) -> Result<Vec<LandingZone>, StoreError> {
        Ok(self.state.lock().zones.clone())
    }

    async fn get_zone_by_name(&self, name: &str) -> Result<Option<LandingZone>, StoreError> {
        Ok(self.state.lock().zones.iter().find(|z| z.name == name).cloned())
    }

    async fn list_processed_before(
        &self,
        zone_id: &ZoneId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LandingFile>, StoreError> {
        Ok(self
            .state
            .lock()
            .files
            .iter()
            .filter(|f| {
                f.zone_id == *zone_id && matches!(f.processed_at, Some(at) if at < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn delete_file(&self, zone_id: &ZoneId, path: &str) -> Result<(), StoreError> {
        self.state.lock().files.retain(|f| !(f.zone_id == *zone_id && f.path == path));
        Ok(())
    }
}

#[async_trait]
impl ReaperStatusStore for MemStore {
    async fn record_sweep(&self, status: &SweepStatus) -> Result<(), StoreError> {
        self.state.lock().sweep = Some(*status);
        Ok(())
    }

    async fn last_sweep(&self) -> Result<Option<SweepStatus>, StoreError> {
        Ok(self.state.lock().sweep)
    }
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
