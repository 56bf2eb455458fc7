// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-bound advisory locks.
//!
//! The leader lock rides on a dedicated connection, not the pool: advisory
//! locks belong to the session, and a pooled connection would carry the
//! lock back into the pool. If the session dies, Postgres releases the lock
//! and that automatic release is the failover guarantee.

use crate::StoreError;
use sqlx::postgres::PgConnection;
use sqlx::{Connection, Row};

/// Cluster-wide key for the background-worker leader lock.
pub const LEADER_LOCK_KEY: i64 = 0x0073_6d65_6c74;

/// Holds a process-exclusive advisory lock for the lifetime of its private
/// connection. Dropping the guard closes the connection, which releases the
/// lock server-side.
pub struct AdvisoryLockGuard {
    conn: PgConnection,
    key: i64,
}

/// Attempt to take the advisory lock on a fresh session.
///
/// Returns `Ok(None)` when another session holds the lock.
pub async fn try_advisory_lock(
    database_url: &str,
    key: i64,
) -> Result<Option<AdvisoryLockGuard>, StoreError> {
    let mut conn = PgConnection::connect(database_url).await?;
    let row = sqlx::query("SELECT pg_try_advisory_lock($1) AS locked")
        .bind(key)
        .fetch_one(&mut conn)
        .await?;
    let locked: bool = row.try_get("locked")?;
    if locked {
        Ok(Some(AdvisoryLockGuard { conn, key }))
    } else {
        // Not the leader; don't keep an idle session around.
        let _ = conn.close().await;
        Ok(None)
    }
}

impl AdvisoryLockGuard {
    /// Probe the lock session. Returns false once the connection is gone;
    /// at that point the database has already released the lock and another
    /// replica may be leading.
    pub async fn is_held(&mut self) -> bool {
        sqlx::query("SELECT 1").execute(&mut self.conn).await.is_ok()
    }

    /// Explicitly release the lock and close the session.
    pub async fn release(mut self) {
        let released =
            sqlx::query("SELECT pg_advisory_unlock($1)").bind(self.key).execute(&mut self.conn);
        if let Err(error) = released.await {
            tracing::debug!(%error, "advisory unlock failed; closing session releases it anyway");
        }
        let _ = self.conn.close().await;
    }
}
