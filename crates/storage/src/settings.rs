// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key/value operator settings, re-read by the reaper between sweeps so
//! changes take effect without a restart.

use crate::StoreError;
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Setting keys the kernel reads.
pub mod keys {
    pub const REAPER_INTERVAL_MINUTES: &str = "reaper.interval_minutes";
    pub const KEEP_RUNS: &str = "retention.keep_runs";
    pub const MAX_RUN_AGE_DAYS: &str = "retention.max_run_age_days";
    pub const STUCK_TIMEOUT_MINUTES: &str = "retention.stuck_timeout_minutes";
    pub const PIPELINE_PURGE_DAYS: &str = "retention.pipeline_purge_days";
    pub const LANDING_MAX_AGE_DAYS: &str = "retention.landing_max_age_days";
    pub const AUDIT_MAX_AGE_DAYS: &str = "retention.audit_max_age_days";
}

/// Retention knobs with platform defaults, loaded fresh for each sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionSettings {
    pub reaper_interval_minutes: i64,
    pub keep_runs: i64,
    pub max_run_age_days: i64,
    pub stuck_timeout_minutes: i64,
    pub pipeline_purge_days: i64,
    pub landing_max_age_days: i64,
    pub audit_max_age_days: i64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            reaper_interval_minutes: 60,
            keep_runs: 50,
            max_run_age_days: 90,
            stuck_timeout_minutes: 120,
            pipeline_purge_days: 7,
            landing_max_age_days: 30,
            audit_max_age_days: 180,
        }
    }
}

impl RetentionSettings {
    /// Load from the settings store, falling back to defaults for missing
    /// or unparseable values.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self, StoreError> {
        let defaults = Self::default();
        Ok(Self {
            reaper_interval_minutes: read_i64(store, keys::REAPER_INTERVAL_MINUTES)
                .await?
                .unwrap_or(defaults.reaper_interval_minutes),
            keep_runs: read_i64(store, keys::KEEP_RUNS).await?.unwrap_or(defaults.keep_runs),
            max_run_age_days: read_i64(store, keys::MAX_RUN_AGE_DAYS)
                .await?
                .unwrap_or(defaults.max_run_age_days),
            stuck_timeout_minutes: read_i64(store, keys::STUCK_TIMEOUT_MINUTES)
                .await?
                .unwrap_or(defaults.stuck_timeout_minutes),
            pipeline_purge_days: read_i64(store, keys::PIPELINE_PURGE_DAYS)
                .await?
                .unwrap_or(defaults.pipeline_purge_days),
            landing_max_age_days: read_i64(store, keys::LANDING_MAX_AGE_DAYS)
                .await?
                .unwrap_or(defaults.landing_max_age_days),
            audit_max_age_days: read_i64(store, keys::AUDIT_MAX_AGE_DAYS)
                .await?
                .unwrap_or(defaults.audit_max_age_days),
        })
    }
}

async fn read_i64(store: &dyn SettingsStore, key: &str) -> Result<Option<i64>, StoreError> {
    Ok(store.get(key).await?.and_then(|v| v.trim().parse().ok()))
}

#[derive(Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get("value")).transpose().map_err(StoreError::from)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
