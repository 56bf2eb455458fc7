// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run store: the only writer of run lifecycle state.
//!
//! [`RunStore::update_status`] is atomic (row lock + state-machine check in
//! one transaction) and publishes `run_completed` after a terminal write
//! commits. The notification is best-effort: a lost event is recovered by
//! the evaluator's periodic tick.

use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smelt_core::{PipelineId, Run, RunCompleted, RunId, RunStatus, RUN_COMPLETED_CHANNEL};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

/// Fields a status change may carry along.
#[derive(Debug, Clone)]
pub struct RunUpdate {
    pub status: RunStatus,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
    pub rows_written: Option<i64>,
    pub log_path: Option<String>,
}

impl RunUpdate {
    pub fn to(status: RunStatus) -> Self {
        Self { status, error: None, duration_ms: None, rows_written: None, log_path: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Self::to(RunStatus::Failed) }
    }
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create(&self, run: &Run) -> Result<(), StoreError>;

    async fn get(&self, id: &RunId) -> Result<Option<Run>, StoreError>;

    /// The pipeline's newest run in pending or running, if any.
    async fn active_run(&self, pipeline_id: &PipelineId) -> Result<Option<Run>, StoreError>;

    /// Whether the pipeline has a success run finished strictly after
    /// `after` (any success run when `after` is `None`).
    async fn has_success_since(
        &self,
        pipeline_id: &PipelineId,
        after: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError>;

    /// Atomic status transition; `Ok(None)` when the run does not exist.
    /// Terminal transitions publish `run_completed` after the commit.
    async fn update_status(
        &self,
        id: &RunId,
        update: RunUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Run>, StoreError>;

    async fn list_for_pipeline(
        &self,
        pipeline_id: &PipelineId,
        limit: i64,
    ) -> Result<Vec<Run>, StoreError>;

    /// Delete terminal runs beyond the newest `keep` for one pipeline.
    async fn prune_keep_newest(
        &self,
        pipeline_id: &PipelineId,
        keep: i64,
    ) -> Result<u64, StoreError>;

    /// Delete terminal runs created before `cutoff`, across all pipelines.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Same, scoped to one pipeline (per-pipeline retention overrides).
    async fn prune_older_than_for(
        &self,
        pipeline_id: &PipelineId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Non-terminal runs created before `cutoff` (stuck candidates).
    async fn list_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<Run>, StoreError>;
}

#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RUN_COLUMNS: &str = "id, pipeline_id, status, trigger, started_at, finished_at, \
     duration_ms, rows_written, error, log_path, created_at";

fn run_from_row(row: &PgRow) -> Result<Run, StoreError> {
    let status_text: String = row.try_get("status")?;
    let status = RunStatus::parse(&status_text)
        .ok_or_else(|| StoreError::corrupt("runs", format!("unknown status {status_text:?}")))?;
    let id: String = row.try_get("id")?;
    let pipeline_id: String = row.try_get("pipeline_id")?;
    Ok(Run {
        id: RunId::from_string(id),
        pipeline_id: PipelineId::from_string(pipeline_id),
        status,
        trigger: row.try_get("trigger")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        duration_ms: row.try_get("duration_ms")?,
        rows_written: row.try_get("rows_written")?,
        error: row.try_get("error")?,
        log_path: row.try_get("log_path")?,
        created_at: row.try_get("created_at")?,
    })
}

impl PgRunStore {
    /// Best-effort fan-out after a terminal commit. The row write has
    /// already succeeded, so a publish failure is logged and swallowed.
    async fn publish_completed(&self, run: &Run) {
        let payload = RunCompleted {
            run_id: run.id,
            pipeline_id: run.pipeline_id,
            status: run.status,
        }
        .encode();
        let result = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(RUN_COMPLETED_CHANNEL)
            .bind(&payload)
            .execute(&self.pool)
            .await;
        if let Err(error) = result {
            tracing::warn!(run = %run.id, %error, "failed to publish run_completed");
        }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create(&self, run: &Run) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO runs (id, pipeline_id, status, trigger, started_at, finished_at, \
             duration_ms, rows_written, error, log_path, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(run.id.as_str())
        .bind(run.pipeline_id.as_str())
        .bind(run.status.as_str())
        .bind(&run.trigger)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.duration_ms)
        .bind(run.rows_written)
        .bind(&run.error)
        .bind(&run.log_path)
        .bind(run.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &RunId) -> Result<Option<Run>, StoreError> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn active_run(&self, pipeline_id: &PipelineId) -> Result<Option<Run>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM runs \
             WHERE pipeline_id = $1 AND status IN ('pending', 'running') \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(pipeline_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn has_success_since(
        &self,
        pipeline_id: &PipelineId,
        after: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM runs \
             WHERE pipeline_id = $1 AND status = 'success' \
               AND ($2::timestamptz IS NULL OR finished_at > $2)) AS fresh",
        )
        .bind(pipeline_id.as_str())
        .bind(after)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("fresh")?)
    }

    async fn update_status(
        &self,
        id: &RunId,
        update: RunUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Run>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row =
            sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = $1 FOR UPDATE"))
                .bind(id.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut run = run_from_row(&row)?;
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

        sqlx::query(
            "UPDATE runs SET status = $2, started_at = $3, finished_at = $4, \
             duration_ms = $5, rows_written = $6, error = $7, log_path = $8 \
             WHERE id = $1",
        )
        .bind(run.id.as_str())
        .bind(run.status.as_str())
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.duration_ms)
        .bind(run.rows_written)
        .bind(&run.error)
        .bind(&run.log_path)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if run.status.is_terminal() {
            self.publish_completed(&run).await;
        }
        Ok(Some(run))
    }

    async fn list_for_pipeline(
        &self,
        pipeline_id: &PipelineId,
        limit: i64,
    ) -> Result<Vec<Run>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE pipeline_id = $1 \
             ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(pipeline_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(run_from_row).collect()
    }

    async fn prune_keep_newest(
        &self,
        pipeline_id: &PipelineId,
        keep: i64,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM runs WHERE pipeline_id = $1 \
               AND status IN ('success', 'failed', 'cancelled') \
               AND id NOT IN (SELECT id FROM runs WHERE pipeline_id = $1 \
                              ORDER BY created_at DESC LIMIT $2)",
        )
        .bind(pipeline_id.as_str())
        .bind(keep)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM runs WHERE status IN ('success', 'failed', 'cancelled') \
               AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn prune_older_than_for(
        &self,
        pipeline_id: &PipelineId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM runs WHERE pipeline_id = $1 \
               AND status IN ('success', 'failed', 'cancelled') AND created_at < $2",
        )
        .bind(pipeline_id.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<Run>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM runs \
             WHERE status IN ('pending', 'running') AND created_at < $1"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(run_from_row).collect()
    }
}
