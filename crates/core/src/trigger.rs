// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger rows: durable rules that fire pipeline runs in response to time,
//! events, or external signals.
//!
//! Trigger configuration is an opaque JSON document at the store boundary;
//! the typed accessors here pull out the fields each trigger kind needs and
//! tolerate anything extra.

use crate::{PipelineId, PipelineRef, RunId, TriggerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    LandingZoneUpload,
    Cron,
    PipelineSuccess,
    Webhook,
    FilePattern,
    CronDependency,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::LandingZoneUpload => "landing_zone_upload",
            TriggerKind::Cron => "cron",
            TriggerKind::PipelineSuccess => "pipeline_success",
            TriggerKind::Webhook => "webhook",
            TriggerKind::FilePattern => "file_pattern",
            TriggerKind::CronDependency => "cron_dependency",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "landing_zone_upload" => Some(TriggerKind::LandingZoneUpload),
            "cron" => Some(TriggerKind::Cron),
            "pipeline_success" => Some(TriggerKind::PipelineSuccess),
            "webhook" => Some(TriggerKind::Webhook),
            "file_pattern" => Some(TriggerKind::FilePattern),
            "cron_dependency" => Some(TriggerKind::CronDependency),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque trigger configuration with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerConfig(pub serde_json::Value);

impl TriggerConfig {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// Cron expression for cron and cron_dependency triggers.
    pub fn cron(&self) -> Option<&str> {
        self.str_field("cron")
    }

    /// Upstream pipeline references for cron_dependency and pipeline_success
    /// triggers. Unparseable entries are dropped.
    pub fn upstreams(&self) -> Vec<PipelineRef> {
        self.0
            .get("depends_on")
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.as_str())
                    .filter_map(|s| PipelineRef::parse(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stored token hash for webhook triggers.
    pub fn token_hash(&self) -> Option<&str> {
        self.str_field("token_hash")
    }

    /// Landing zone name for landing_zone_upload and file_pattern triggers.
    pub fn zone(&self) -> Option<&str> {
        self.str_field("zone")
    }

    /// File glob for file_pattern triggers.
    pub fn pattern(&self) -> Option<&str> {
        self.str_field("pattern")
    }

    /// Short human summary used in run trigger labels.
    pub fn summary(&self, kind: TriggerKind) -> String {
        match kind {
            TriggerKind::Cron | TriggerKind::CronDependency => {
                self.cron().unwrap_or("?").to_string()
            }
            TriggerKind::Webhook => self.str_field("name").unwrap_or("webhook").to_string(),
            TriggerKind::PipelineSuccess => {
                let ups = self.upstreams();
                if ups.is_empty() {
                    "upstream".to_string()
                } else {
                    ups.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(",")
                }
            }
            TriggerKind::LandingZoneUpload => self.zone().unwrap_or("?").to_string(),
            TriggerKind::FilePattern => {
                format!("{}:{}", self.zone().unwrap_or("?"), self.pattern().unwrap_or("*"))
            }
        }
    }
}

/// A trigger as stored; `last_triggered_at` strictly increases across
/// successful firings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    pub pipeline_id: PipelineId,
    pub kind: TriggerKind,
    pub config: TriggerConfig,
    pub enabled: bool,
    pub cooldown_seconds: i64,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_run_id: Option<RunId>,
}

impl Trigger {
    /// Cooldown gate: no firing may occur within `cooldown_seconds` of
    /// `last_triggered_at`, regardless of other conditions.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered_at {
            Some(last) if self.cooldown_seconds > 0 => {
                now < last + chrono::Duration::seconds(self.cooldown_seconds)
            }
            _ => false,
        }
    }

    /// Run trigger label, e.g. `trigger:webhook:deploy-hook`.
    pub fn label(&self) -> String {
        format!("trigger:{}:{}", self.kind, self.config.summary(self.kind))
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
