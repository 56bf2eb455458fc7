// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Landing zone and landing file rows, as the reaper and the trigger paths
//! see them. Zone CRUD belongs to the API layer.

use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smelt_core::ZoneId;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandingZone {
    pub id: ZoneId,
    pub name: String,
    pub auto_purge: bool,
    /// Per-zone cap on processed-file age; `None` falls back to the
    /// platform default.
    pub max_age_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandingFile {
    pub zone_id: ZoneId,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait LandingZoneStore: Send + Sync {
    async fn list_zones(&self) -> Result<Vec<LandingZone>, StoreError>;

    /// Zone lookup by name, used when a webhook or upload names its zone.
    async fn get_zone_by_name(&self, name: &str) -> Result<Option<LandingZone>, StoreError>;

    /// Processed files older than `cutoff` in one zone.
    async fn list_processed_before(
        &self,
        zone_id: &ZoneId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LandingFile>, StoreError>;

    async fn delete_file(&self, zone_id: &ZoneId, path: &str) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgLandingZoneStore {
    pool: PgPool,
}

impl PgLandingZoneStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn zone_from_row(row: &PgRow) -> Result<LandingZone, StoreError> {
    let id: String = row.try_get("id")?;
    Ok(LandingZone {
        id: ZoneId::from_string(id),
        name: row.try_get("name")?,
        auto_purge: row.try_get("auto_purge")?,
        max_age_days: row.try_get("max_age_days")?,
    })
}

fn file_from_row(row: &PgRow) -> Result<LandingFile, StoreError> {
    let zone_id: String = row.try_get("zone_id")?;
    Ok(LandingFile {
        zone_id: ZoneId::from_string(zone_id),
        path: row.try_get("path")?,
        uploaded_at: row.try_get("uploaded_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

#[async_trait]
impl LandingZoneStore for PgLandingZoneStore {
    async fn list_zones(&self) -> Result<Vec<LandingZone>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, auto_purge, max_age_days FROM landing_zones ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(zone_from_row).collect()
    }

    async fn get_zone_by_name(&self, name: &str) -> Result<Option<LandingZone>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, auto_purge, max_age_days FROM landing_zones WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(zone_from_row).transpose()
    }

    async fn list_processed_before(
        &self,
        zone_id: &ZoneId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LandingFile>, StoreError> {
        let rows = sqlx::query(
            "SELECT zone_id, path, uploaded_at, processed_at FROM landing_files \
             WHERE zone_id = $1 AND processed_at IS NOT NULL AND processed_at < $2",
        )
        .bind(zone_id.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(file_from_row).collect()
    }

    async fn delete_file(&self, zone_id: &ZoneId, path: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM landing_files WHERE zone_id = $1 AND path = $2")
            .bind(zone_id.as_str())
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
