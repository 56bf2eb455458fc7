// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline store. Creation and soft-deletion belong to the API layer; the
//! kernel reads identity and hard-deletes after the purge window.

use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smelt_core::{Layer, Pipeline, PipelineId, PipelineKind, PipelineRef, RetentionOverride};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn get(&self, id: &PipelineId) -> Result<Option<Pipeline>, StoreError>;

    async fn get_by_ref(&self, reference: &PipelineRef) -> Result<Option<Pipeline>, StoreError>;

    /// Live (not soft-deleted) pipelines.
    async fn list(&self) -> Result<Vec<Pipeline>, StoreError>;

    /// Pipelines soft-deleted before `cutoff`, ready for the reaper.
    async fn list_deleted_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Pipeline>, StoreError>;

    /// Hard delete; runs, schedules, and triggers cascade in the schema.
    async fn hard_delete(&self, id: &PipelineId) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgPipelineStore {
    pool: PgPool,
}

impl PgPipelineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PIPELINE_COLUMNS: &str =
    "id, namespace, layer, name, kind, deleted_at, keep_runs, max_run_age_days";

fn pipeline_from_row(row: &PgRow) -> Result<Pipeline, StoreError> {
    let layer_text: String = row.try_get("layer")?;
    let layer = Layer::parse(&layer_text)
        .ok_or_else(|| StoreError::corrupt("pipelines", format!("unknown layer {layer_text:?}")))?;
    let kind_text: String = row.try_get("kind")?;
    let kind = PipelineKind::parse(&kind_text)
        .ok_or_else(|| StoreError::corrupt("pipelines", format!("unknown kind {kind_text:?}")))?;
    let id: String = row.try_get("id")?;
    Ok(Pipeline {
        id: PipelineId::from_string(id),
        namespace: row.try_get("namespace")?,
        layer,
        name: row.try_get("name")?,
        kind,
        deleted_at: row.try_get("deleted_at")?,
        retention: RetentionOverride {
            keep_runs: row.try_get("keep_runs")?,
            max_run_age_days: row.try_get("max_run_age_days")?,
        },
    })
}

#[async_trait]
impl PipelineStore for PgPipelineStore {
    async fn get(&self, id: &PipelineId) -> Result<Option<Pipeline>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(pipeline_from_row).transpose()
    }

    async fn get_by_ref(&self, reference: &PipelineRef) -> Result<Option<Pipeline>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PIPELINE_COLUMNS} FROM pipelines \
             WHERE namespace = $1 AND layer = $2 AND name = $3 AND deleted_at IS NULL"
        ))
        .bind(&reference.namespace)
        .bind(reference.layer.as_str())
        .bind(&reference.name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(pipeline_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Pipeline>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE deleted_at IS NULL \
             ORDER BY namespace, layer, name"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(pipeline_from_row).collect()
    }

    async fn list_deleted_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Pipeline>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE deleted_at < $1"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(pipeline_from_row).collect()
    }

    async fn hard_delete(&self, id: &PipelineId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pipelines WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
