// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event payloads carried over the database notification channels.
//!
//! Delivery is at-most-once and best-effort; subscribers must treat these
//! as hints, with periodic ticks as the correctness floor.

use crate::{PipelineId, RunId, RunStatus};
use serde::{Deserialize, Serialize};

/// Channel a run's terminal transition is announced on.
pub const RUN_COMPLETED_CHANNEL: &str = "run_completed";

/// Published by the run store whenever a run enters a terminal status,
/// after the row write is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCompleted {
    pub run_id: RunId,
    pub pipeline_id: PipelineId,
    pub status: RunStatus,
}

impl RunCompleted {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
