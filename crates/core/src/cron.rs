// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Five-field cron parsing and due-ness math.
//!
//! Expressions are evaluated in the process time zone; callers hold and
//! compare UTC timestamps. A bad expression is an invalid-input error the
//! caller logs and skips; it never stops a tick.

use chrono::{DateTime, Local, Utc};
use croner::Cron;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid cron expression {expr:?}: {source}")]
pub struct CronParseError {
    pub expr: String,
    #[source]
    source: croner::errors::CronError,
}

/// A parsed cron expression.
pub struct CronSchedule {
    expr: String,
    cron: Cron,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, CronParseError> {
        let cron = Cron::new(expr)
            .parse()
            .map_err(|source| CronParseError { expr: expr.to_string(), source })?;
        Ok(Self { expr: expr.to_string(), cron })
    }

    pub fn expression(&self) -> &str {
        &self.expr
    }

    /// First occurrence strictly after `after`, or `None` if the expression
    /// never matches again.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&Local);
        self.cron.find_next_occurrence(&local, false).ok().map(|t| t.with_timezone(&Utc))
    }

    /// Whether at least one occurrence falls in `(last, now]`.
    pub fn due_since(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.next_after(last) {
            Some(next) => next <= now,
            None => false,
        }
    }
}

impl std::fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expr).finish()
    }
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
