// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule store.

use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smelt_core::{PipelineId, RunId, Schedule, ScheduleId};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn list_enabled(&self) -> Result<Vec<Schedule>, StoreError>;

    /// Initialize or reset `next_run_at` without counting a firing.
    async fn set_next_run(&self, id: &ScheduleId, next: DateTime<Utc>) -> Result<(), StoreError>;

    /// Record a firing: last_run_id, last_run_at, and next_run_at change
    /// together or not at all.
    async fn record_fired(
        &self,
        id: &ScheduleId,
        run_id: &RunId,
        at: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgScheduleStore {
    pool: PgPool,
}

impl PgScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn schedule_from_row(row: &PgRow) -> Result<Schedule, StoreError> {
    let id: String = row.try_get("id")?;
    let pipeline_id: String = row.try_get("pipeline_id")?;
    let last_run_id: Option<String> = row.try_get("last_run_id")?;
    Ok(Schedule {
        id: ScheduleId::from_string(id),
        pipeline_id: PipelineId::from_string(pipeline_id),
        cron: row.try_get("cron")?,
        enabled: row.try_get("enabled")?,
        last_run_id: last_run_id.map(RunId::from_string),
        last_run_at: row.try_get("last_run_at")?,
        next_run_at: row.try_get("next_run_at")?,
    })
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn list_enabled(&self) -> Result<Vec<Schedule>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, pipeline_id, cron, enabled, last_run_id, last_run_at, next_run_at \
             FROM schedules WHERE enabled ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    async fn set_next_run(&self, id: &ScheduleId, next: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE schedules SET next_run_at = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(next)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_fired(
        &self,
        id: &ScheduleId,
        run_id: &RunId,
        at: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE schedules SET last_run_id = $2, last_run_at = $3, next_run_at = $4 \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(run_id.as_str())
        .bind(at)
        .bind(next)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
