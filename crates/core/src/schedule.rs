// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron schedule rows.

use crate::{PipelineId, RunId, ScheduleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cron schedule attached to a pipeline.
///
/// `next_run_at` is always computed from *now* when the schedule fires or is
/// initialized, never from the previous value: a schedule that was missed
/// for hours catches up with exactly one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub pipeline_id: PipelineId,
    /// Five-field cron expression (minute, hour, day-of-month, month,
    /// day-of-week), evaluated in the process time zone.
    pub cron: String,
    pub enabled: bool,
    pub last_run_id: Option<RunId>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}
