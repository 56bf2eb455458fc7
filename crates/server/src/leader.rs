// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader election over a session-bound advisory lock.
//!
//! Exactly one replica holds the lock and runs the background workers
//! (scheduler, evaluator, reaper). The correctness guarantee is the
//! database's: if the lock session dies, the database releases the lock,
//! and no other replica can have started workers before that happens.
//!
//! State machine: follower → (try_acquire) → leader → (lock lost or Stop)
//! → stop workers → follower / stopped.

use async_trait::async_trait;
use smelt_storage::{try_advisory_lock, AdvisoryLockGuard, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);
const LOCK_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// A held leadership lock; lives as long as its backing session.
#[async_trait]
pub trait LeaderLock: Send {
    /// Probe the lock session. False means the database has already
    /// released the lock.
    async fn is_held(&mut self) -> bool;

    async fn release(self: Box<Self>);
}

#[async_trait]
pub trait LockProvider: Send + Sync {
    async fn try_acquire(&self) -> Result<Option<Box<dyn LeaderLock>>, StoreError>;
}

/// Advisory-lock provider against the transactional store.
pub struct PgLockProvider {
    database_url: String,
    key: i64,
}

impl PgLockProvider {
    pub fn new(database_url: impl Into<String>, key: i64) -> Self {
        Self { database_url: database_url.into(), key }
    }
}

#[async_trait]
impl LeaderLock for AdvisoryLockGuard {
    async fn is_held(&mut self) -> bool {
        AdvisoryLockGuard::is_held(self).await
    }

    async fn release(self: Box<Self>) {
        AdvisoryLockGuard::release(*self).await;
    }
}

#[async_trait]
impl LockProvider for PgLockProvider {
    async fn try_acquire(&self) -> Result<Option<Box<dyn LeaderLock>>, StoreError> {
        Ok(try_advisory_lock(&self.database_url, self.key)
            .await?
            .map(|guard| Box::new(guard) as Box<dyn LeaderLock>))
    }
}

/// Running background workers: one cancellation token, one task per
/// worker. Stop cancels the token and awaits every task.
pub struct WorkerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn new(cancel: CancellationToken, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { cancel, tasks }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(error) = task.await {
                tracing::warn!(%error, "background worker ended abnormally");
            }
        }
    }
}

/// Factory for the background workers a leader runs.
#[async_trait]
pub trait WorkerSet: Send + Sync {
    async fn start(&self) -> WorkerHandle;
}

pub struct LeaderElector {
    lock: Arc<dyn LockProvider>,
    workers: Arc<dyn WorkerSet>,
    retry_interval: Duration,
}

impl LeaderElector {
    pub fn new(lock: Arc<dyn LockProvider>, workers: Arc<dyn WorkerSet>) -> Self {
        Self { lock, workers, retry_interval: DEFAULT_RETRY_INTERVAL }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Follower/leader loop until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                acquired = self.lock.try_acquire() => match acquired {
                    Ok(Some(lock)) => {
                        self.lead(lock, &cancel).await;
                        if cancel.is_cancelled() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(error) => {
                        tracing::warn!(%error, "leader lock acquisition failed");
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }

    /// Hold leadership while the lock session lives. A replica that loses
    /// the lock stops its workers before returning to the retry loop.
    async fn lead(&self, mut lock: Box<dyn LeaderLock>, cancel: &CancellationToken) {
        tracing::info!("acquired leadership; starting background workers");
        let handle = self.workers.start().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    handle.stop().await;
                    lock.release().await;
                    tracing::info!("leadership released on shutdown");
                    return;
                }
                _ = tokio::time::sleep(LOCK_CHECK_INTERVAL) => {
                    if !lock.is_held().await {
                        tracing::warn!("leader lock lost; stopping background workers");
                        handle.stop().await;
                        lock.release().await;
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "leader_tests.rs"]
mod tests;
