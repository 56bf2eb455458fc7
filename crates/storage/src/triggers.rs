// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger store.

use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smelt_core::{PipelineId, RunId, Trigger, TriggerConfig, TriggerId, TriggerKind};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn get(&self, id: &TriggerId) -> Result<Option<Trigger>, StoreError>;

    async fn list_enabled(&self) -> Result<Vec<Trigger>, StoreError>;

    async fn list_enabled_by_kind(&self, kind: TriggerKind) -> Result<Vec<Trigger>, StoreError>;

    /// Record a firing. `last_triggered_at` strictly increases; a stale
    /// write (at ≤ stored value) is ignored.
    async fn record_fired(
        &self,
        id: &TriggerId,
        run_id: &RunId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Initialize `last_triggered_at` without counting a firing (first
    /// sighting of a cron trigger). Same monotonic guard as record_fired.
    async fn touch(&self, id: &TriggerId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgTriggerStore {
    pool: PgPool,
}

impl PgTriggerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TRIGGER_COLUMNS: &str =
    "id, pipeline_id, kind, config, enabled, cooldown_seconds, last_triggered_at, last_run_id";

fn trigger_from_row(row: &PgRow) -> Result<Trigger, StoreError> {
    let kind_text: String = row.try_get("kind")?;
    let kind = TriggerKind::parse(&kind_text)
        .ok_or_else(|| StoreError::corrupt("triggers", format!("unknown kind {kind_text:?}")))?;
    let id: String = row.try_get("id")?;
    let pipeline_id: String = row.try_get("pipeline_id")?;
    let config: serde_json::Value = row.try_get("config")?;
    let last_run_id: Option<String> = row.try_get("last_run_id")?;
    Ok(Trigger {
        id: TriggerId::from_string(id),
        pipeline_id: PipelineId::from_string(pipeline_id),
        kind,
        config: TriggerConfig(config),
        enabled: row.try_get("enabled")?,
        cooldown_seconds: row.try_get("cooldown_seconds")?,
        last_triggered_at: row.try_get("last_triggered_at")?,
        last_run_id: last_run_id.map(RunId::from_string),
    })
}

#[async_trait]
impl TriggerStore for PgTriggerStore {
    async fn get(&self, id: &TriggerId) -> Result<Option<Trigger>, StoreError> {
        let row = sqlx::query(&format!("SELECT {TRIGGER_COLUMNS} FROM triggers WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(trigger_from_row).transpose()
    }

    async fn list_enabled(&self) -> Result<Vec<Trigger>, StoreError> {
        let rows =
            sqlx::query(&format!("SELECT {TRIGGER_COLUMNS} FROM triggers WHERE enabled ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(trigger_from_row).collect()
    }

    async fn list_enabled_by_kind(&self, kind: TriggerKind) -> Result<Vec<Trigger>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TRIGGER_COLUMNS} FROM triggers WHERE enabled AND kind = $1 ORDER BY id"
        ))
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(trigger_from_row).collect()
    }

    async fn record_fired(
        &self,
        id: &TriggerId,
        run_id: &RunId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE triggers SET last_run_id = $2, last_triggered_at = $3 \
             WHERE id = $1 AND (last_triggered_at IS NULL OR last_triggered_at < $3)",
        )
        .bind(id.as_str())
        .bind(run_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch(&self, id: &TriggerId, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE triggers SET last_triggered_at = $2 \
             WHERE id = $1 AND (last_triggered_at IS NULL OR last_triggered_at < $2)",
        )
        .bind(id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
