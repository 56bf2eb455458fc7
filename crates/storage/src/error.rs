// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error taxonomy.

use smelt_core::run::TransitionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A row carried a value the domain types reject (unknown status string,
    /// malformed JSON config). Indicates out-of-band writes or skew.
    #[error("corrupt row in {table}: {detail}")]
    CorruptRow { table: &'static str, detail: String },

    /// The run state machine forbids the requested status change.
    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),
}

impl StoreError {
    pub fn corrupt(table: &'static str, detail: impl Into<String>) -> Self {
        StoreError::CorruptRow { table, detail: detail.into() }
    }

    /// Connection-level errors worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Database(
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            )
        )
    }
}
