// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline identity and the fields of it the control plane reads.
//!
//! Pipelines are owned by the API layer; the orchestration kernel only needs
//! identity, soft-delete state, and retention overrides. Pipelines reference
//! each other by `(namespace, layer, name)` strings, never by pointer, so
//! dependency cycles are expressible but harmless here.

use crate::PipelineId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stratified data lifecycle tag, part of pipeline identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bronze" => Some(Layer::Bronze),
            "silver" => Some(Layer::Silver),
            "gold" => Some(Layer::Gold),
            _ => None,
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of source artifact the pipeline executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Sql,
    Python,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Sql => "sql",
            PipelineKind::Python => "python",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sql" => Some(PipelineKind::Sql),
            "python" => Some(PipelineKind::Python),
            _ => None,
        }
    }
}

/// `namespace.layer.name`, the human identity of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineRef {
    pub namespace: String,
    pub layer: Layer,
    pub name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid pipeline reference {0:?}: expected namespace.layer.name")]
pub struct RefParseError(pub String);

impl PipelineRef {
    pub fn new(namespace: impl Into<String>, layer: Layer, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), layer, name: name.into() }
    }

    /// Parse `ns.layer.name`. The name segment may itself contain dots;
    /// only the first two separators are structural.
    pub fn parse(s: &str) -> Result<Self, RefParseError> {
        let mut parts = s.splitn(3, '.');
        let (ns, layer, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(ns), Some(layer), Some(name)) if !ns.is_empty() && !name.is_empty() => {
                (ns, layer, name)
            }
            _ => return Err(RefParseError(s.to_string())),
        };
        let layer = Layer::parse(layer).ok_or_else(|| RefParseError(s.to_string()))?;
        Ok(Self::new(ns, layer, name))
    }
}

impl std::fmt::Display for PipelineRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.namespace, self.layer, self.name)
    }
}

/// Per-pipeline retention overrides; `None` falls back to platform settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionOverride {
    /// Keep at most this many runs for the pipeline.
    pub keep_runs: Option<i64>,
    /// Delete terminal runs older than this many days.
    pub max_run_age_days: Option<i64>,
}

/// A pipeline as the orchestration kernel sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub namespace: String,
    pub layer: Layer,
    pub name: String,
    pub kind: PipelineKind,
    /// Set when the API soft-deletes the pipeline; the reaper hard-deletes
    /// after the purge window.
    pub deleted_at: Option<DateTime<Utc>>,
    pub retention: RetentionOverride,
}

impl Pipeline {
    pub fn reference(&self) -> PipelineRef {
        PipelineRef::new(self.namespace.clone(), self.layer, self.name.clone())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
