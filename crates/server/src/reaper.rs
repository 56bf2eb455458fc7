// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention reaper: periodic deletion of data past its retention policy.
//!
//! Each sweep performs six independent tasks in sequence. Every task runs
//! in its own spawned task so a panic or error in one never blocks the
//! others; counts are recorded either way. The sweep interval is re-read
//! from the settings store after each sweep (floor: one minute) so
//! operator changes take effect without a restart.

use crate::branches::{BranchCatalog, CatalogError};
use crate::object_store::{pipeline_source_prefix, ObjectStore, ObjectStoreError};
use smelt_core::{Clock, RunId};
use smelt_storage::{
    AuditStore, LandingZoneStore, PipelineStore, ReaperStatusStore, RetentionSettings, RunStore,
    RunUpdate, SettingsStore, StoreError, SweepStatus,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const STUCK_RUN_ERROR: &str = "run timed out";

#[derive(Debug, Error)]
enum SweepError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Objects(#[from] ObjectStoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub struct Reaper<C: Clock> {
    runs: Arc<dyn RunStore>,
    pipelines: Arc<dyn PipelineStore>,
    zones: Arc<dyn LandingZoneStore>,
    audit: Arc<dyn AuditStore>,
    settings: Arc<dyn SettingsStore>,
    status: Arc<dyn ReaperStatusStore>,
    objects: Arc<dyn ObjectStore>,
    branches: Arc<dyn BranchCatalog>,
    clock: C,
}

/// Sweep cadence with the one-minute hard floor applied.
fn sweep_interval(settings: &RetentionSettings) -> Duration {
    Duration::from_secs(settings.reaper_interval_minutes.max(1) as u64 * 60)
}

/// Run one task isolated in its own tokio task; panics and errors are
/// logged and count as zero.
async fn guarded<F>(name: &'static str, fut: F) -> u64
where
    F: Future<Output = Result<u64, SweepError>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(Ok(count)) => count,
        Ok(Err(error)) => {
            tracing::warn!(task = name, %error, "reaper task failed");
            0
        }
        Err(error) => {
            tracing::error!(task = name, %error, "reaper task panicked");
            0
        }
    }
}

impl<C: Clock> Reaper<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runs: Arc<dyn RunStore>,
        pipelines: Arc<dyn PipelineStore>,
        zones: Arc<dyn LandingZoneStore>,
        audit: Arc<dyn AuditStore>,
        settings: Arc<dyn SettingsStore>,
        status: Arc<dyn ReaperStatusStore>,
        objects: Arc<dyn ObjectStore>,
        branches: Arc<dyn BranchCatalog>,
        clock: C,
    ) -> Arc<Self> {
        Arc::new(Self {
            runs,
            pipelines,
            zones,
            audit,
            settings,
            status,
            objects,
            branches,
            clock,
        })
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!("reaper started");
        loop {
            let settings = match RetentionSettings::load(&*self.settings).await {
                Ok(settings) => settings,
                Err(error) => {
                    tracing::warn!(%error, "failed to load retention settings; using defaults");
                    RetentionSettings::default()
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("reaper stopped");
                    return;
                }
                _ = tokio::time::sleep(sweep_interval(&settings)) => {
                    self.sweep(&settings).await;
                }
            }
        }
    }

    /// One full sweep; counts are persisted even when tasks fail.
    pub async fn sweep(self: &Arc<Self>, settings: &RetentionSettings) -> SweepStatus {
        let settings = *settings;
        let started = self.clock.now_utc();

        let r = self.clone();
        let runs_pruned = guarded("prune-runs", async move { r.prune_runs(&settings).await }).await;

        let r = self.clone();
        let runs_failed =
            guarded("fail-stuck-runs", async move { r.fail_stuck_runs(&settings).await }).await;

        let r = self.clone();
        let pipelines_purged =
            guarded("purge-pipelines", async move { r.purge_pipelines(&settings).await }).await;

        let r = self.clone();
        let branches_deleted =
            guarded("clean-branches", async move { r.clean_orphan_branches().await }).await;

        let r = self.clone();
        let files_purged =
            guarded("purge-landing", async move { r.purge_landing_files(&settings).await }).await;

        let r = self.clone();
        let audit_pruned =
            guarded("prune-audit", async move { r.prune_audit(&settings).await }).await;

        let status = SweepStatus {
            last_run_at: started,
            runs_pruned,
            runs_failed,
            pipelines_purged,
            branches_deleted,
            files_purged,
            audit_pruned,
        };
        if let Err(error) = self.status.record_sweep(&status).await {
            tracing::warn!(%error, "failed to persist reaper status");
        }
        tracing::info!(
            runs_pruned,
            runs_failed,
            pipelines_purged,
            branches_deleted,
            files_purged,
            audit_pruned,
            "reaper sweep complete"
        );
        status
    }

    /// Task 1: per-pipeline caps (with overrides), then the global age cap.
    /// Non-terminal runs are always preserved by the store queries.
    async fn prune_runs(&self, settings: &RetentionSettings) -> Result<u64, SweepError> {
        let mut count = 0;
        for pipeline in self.pipelines.list().await? {
            let keep = pipeline.retention.keep_runs.unwrap_or(settings.keep_runs);
            count += self.runs.prune_keep_newest(&pipeline.id, keep).await?;
            if let Some(days) = pipeline.retention.max_run_age_days {
                let cutoff = self.clock.now_utc() - chrono::Duration::days(days);
                count += self.runs.prune_older_than_for(&pipeline.id, cutoff).await?;
            }
        }
        let cutoff = self.clock.now_utc() - chrono::Duration::days(settings.max_run_age_days);
        count += self.runs.prune_older_than(cutoff).await?;
        Ok(count)
    }

    /// Task 2: force-fail runs stuck in pending/running past the timeout.
    async fn fail_stuck_runs(&self, settings: &RetentionSettings) -> Result<u64, SweepError> {
        let cutoff =
            self.clock.now_utc() - chrono::Duration::minutes(settings.stuck_timeout_minutes);
        let mut count = 0;
        for run in self.runs.list_stuck(cutoff).await? {
            let result = self
                .runs
                .update_status(&run.id, RunUpdate::failed(STUCK_RUN_ERROR), self.clock.now_utc())
                .await;
            match result {
                Ok(Some(_)) => count += 1,
                Ok(None) => {}
                // Lost a race with a real completion; that is fine.
                Err(StoreError::IllegalTransition(_)) => {}
                Err(error) => return Err(error.into()),
            }
        }
        Ok(count)
    }

    /// Task 3: hard-delete pipelines past the soft-delete purge window,
    /// removing their object-store files best-effort per file.
    async fn purge_pipelines(&self, settings: &RetentionSettings) -> Result<u64, SweepError> {
        let cutoff =
            self.clock.now_utc() - chrono::Duration::days(settings.pipeline_purge_days);
        let mut count = 0;
        for pipeline in self.pipelines.list_deleted_before(cutoff).await? {
            let prefix = pipeline_source_prefix(&pipeline.reference());
            match self.objects.list(&prefix).await {
                Ok(paths) => {
                    for path in paths {
                        if let Err(error) = self.objects.delete(&path).await {
                            tracing::warn!(%path, %error, "failed to delete pipeline file");
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(pipeline = %pipeline.id, %error, "failed to list pipeline files");
                }
            }
            self.pipelines.hard_delete(&pipeline.id).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Task 4: delete catalog branches whose runs are missing or terminal.
    async fn clean_orphan_branches(&self) -> Result<u64, SweepError> {
        let mut count = 0;
        for name in self.branches.list_branches().await? {
            if !name.starts_with(RunId::PREFIX) {
                continue;
            }
            let run = self.runs.get(&RunId::from_string(&name)).await?;
            let orphaned = match run {
                None => true,
                Some(run) => run.status.is_terminal(),
            };
            if orphaned {
                self.branches.delete_branch(&name).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Task 5: purge processed landing files in auto-purge zones past the
    /// per-zone age (default 30 days). The row survives until the object
    /// delete succeeds, so failures retry on the next sweep.
    async fn purge_landing_files(&self, settings: &RetentionSettings) -> Result<u64, SweepError> {
        let mut count = 0;
        for zone in self.zones.list_zones().await? {
            if !zone.auto_purge {
                continue;
            }
            let max_age = zone.max_age_days.unwrap_or(settings.landing_max_age_days);
            let cutoff = self.clock.now_utc() - chrono::Duration::days(max_age);
            for file in self.zones.list_processed_before(&zone.id, cutoff).await? {
                if let Err(error) = self.objects.delete(&file.path).await {
                    tracing::warn!(path = %file.path, %error, "failed to delete landing file");
                    continue;
                }
                self.zones.delete_file(&zone.id, &file.path).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Task 6: prune audit entries past the audit max age.
    async fn prune_audit(&self, settings: &RetentionSettings) -> Result<u64, SweepError> {
        let cutoff = self.clock.now_utc() - chrono::Duration::days(settings.audit_max_age_days);
        Ok(self.audit.prune_older_than(cutoff).await?)
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
