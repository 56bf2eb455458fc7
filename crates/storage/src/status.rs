// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reaper sweep status: last run time and per-task counts, persisted after
//! every sweep so operators can see what the reaper did.

use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepStatus {
    pub last_run_at: DateTime<Utc>,
    pub runs_pruned: u64,
    pub runs_failed: u64,
    pub pipelines_purged: u64,
    pub branches_deleted: u64,
    pub files_purged: u64,
    pub audit_pruned: u64,
}

impl SweepStatus {
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            last_run_at: at,
            runs_pruned: 0,
            runs_failed: 0,
            pipelines_purged: 0,
            branches_deleted: 0,
            files_purged: 0,
            audit_pruned: 0,
        }
    }
}

#[async_trait]
pub trait ReaperStatusStore: Send + Sync {
    async fn record_sweep(&self, status: &SweepStatus) -> Result<(), StoreError>;
    async fn last_sweep(&self) -> Result<Option<SweepStatus>, StoreError>;
}

#[derive(Clone)]
pub struct PgReaperStatusStore {
    pool: PgPool,
}

impl PgReaperStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReaperStatusStore for PgReaperStatusStore {
    async fn record_sweep(&self, status: &SweepStatus) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reaper_status (id, last_run_at, runs_pruned, runs_failed, \
             pipelines_purged, branches_deleted, files_purged, audit_pruned) \
             VALUES (1, $1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET last_run_at = EXCLUDED.last_run_at, \
             runs_pruned = EXCLUDED.runs_pruned, runs_failed = EXCLUDED.runs_failed, \
             pipelines_purged = EXCLUDED.pipelines_purged, \
             branches_deleted = EXCLUDED.branches_deleted, \
             files_purged = EXCLUDED.files_purged, audit_pruned = EXCLUDED.audit_pruned",
        )
        .bind(status.last_run_at)
        .bind(status.runs_pruned as i64)
        .bind(status.runs_failed as i64)
        .bind(status.pipelines_purged as i64)
        .bind(status.branches_deleted as i64)
        .bind(status.files_purged as i64)
        .bind(status.audit_pruned as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_sweep(&self) -> Result<Option<SweepStatus>, StoreError> {
        let row = sqlx::query(
            "SELECT last_run_at, runs_pruned, runs_failed, pipelines_purged, \
             branches_deleted, files_purged, audit_pruned FROM reaper_status WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(SweepStatus {
            last_run_at: row.try_get("last_run_at")?,
            runs_pruned: row.try_get::<i64, _>("runs_pruned")? as u64,
            runs_failed: row.try_get::<i64, _>("runs_failed")? as u64,
            pipelines_purged: row.try_get::<i64, _>("pipelines_purged")? as u64,
            branches_deleted: row.try_get::<i64, _>("branches_deleted")? as u64,
            files_purged: row.try_get::<i64, _>("files_purged")? as u64,
            audit_pruned: row.try_get::<i64, _>("audit_pruned")? as u64,
        }))
    }
}
