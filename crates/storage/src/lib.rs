// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! smelt-storage: Postgres store adapters for the control plane.
//!
//! Each store is a narrow trait with one Postgres implementation. The store
//! layer is the single source of truth: writes that affect the run
//! lifecycle go through [`RunStore::update_status`], which also publishes
//! the `run_completed` notification. Not-found maps to `Ok(None)` at this
//! boundary; callers never match on a database error to detect absence.

pub mod audit;
pub mod error;
pub mod lock;
pub mod pipelines;
pub mod pool;
pub mod runs;
pub mod schedules;
pub mod settings;
pub mod status;
pub mod triggers;
pub mod zones;

#[cfg(any(test, feature = "test-support"))]
pub mod mem;

pub use audit::{AuditStore, PgAuditStore};
pub use error::StoreError;
pub use lock::{try_advisory_lock, AdvisoryLockGuard, LEADER_LOCK_KEY};
pub use pipelines::{PgPipelineStore, PipelineStore};
pub use pool::{connect, run_migrations};
pub use runs::{PgRunStore, RunStore, RunUpdate};
pub use schedules::{PgScheduleStore, ScheduleStore};
pub use settings::{PgSettingsStore, RetentionSettings, SettingsStore};
pub use status::{PgReaperStatusStore, ReaperStatusStore, SweepStatus};
pub use triggers::{PgTriggerStore, TriggerStore};
pub use zones::{LandingFile, LandingZone, LandingZoneStore, PgLandingZoneStore};
