// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared fake "lock server": at most one holder, sessions can be killed.
#[derive(Clone, Default)]
struct FakeLockServer {
    held_by: Arc<Mutex<Option<u64>>>,
    next_session: Arc<Mutex<u64>>,
}

impl FakeLockServer {
    fn kill_session(&self) {
        // The holder's session dies; the server releases the lock the way
        // the database would.
        *self.held_by.lock() = None;
    }

    fn holder(&self) -> Option<u64> {
        *self.held_by.lock()
    }
}

struct FakeLock {
    server: FakeLockServer,
    session: u64,
}

#[async_trait]
impl LeaderLock for FakeLock {
    async fn is_held(&mut self) -> bool {
        self.server.holder() == Some(self.session)
    }

    async fn release(self: Box<Self>) {
        let mut held = self.server.held_by.lock();
        if *held == Some(self.session) {
            *held = None;
        }
    }
}

struct FakeProvider {
    server: FakeLockServer,
    /// When false, acquisition attempts error (connection trouble).
    reachable: Arc<AtomicBool>,
}

#[async_trait]
impl LockProvider for FakeProvider {
    async fn try_acquire(&self) -> Result<Option<Box<dyn LeaderLock>>, smelt_storage::StoreError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(smelt_storage::StoreError::corrupt("lock", "unreachable"));
        }
        let mut held = self.server.held_by.lock();
        if held.is_some() {
            return Ok(None);
        }
        let session = {
            let mut next = self.server.next_session.lock();
            *next += 1;
            *next
        };
        *held = Some(session);
        Ok(Some(Box::new(FakeLock { server: self.server.clone(), session })))
    }
}

/// Counts concurrent worker sets; the invariant under test is that the
/// count never exceeds one across any number of replicas.
#[derive(Clone, Default)]
struct CountingWorkers {
    active: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerSet for CountingWorkers {
    async fn start(&self) -> WorkerHandle {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.started.fetch_add(1, Ordering::SeqCst);
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let active = self.active.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            token.cancelled().await;
            active.fetch_sub(1, Ordering::SeqCst);
        });
        WorkerHandle::new(cancel, vec![task])
    }
}

fn replica(
    server: &FakeLockServer,
    workers: &CountingWorkers,
) -> (LeaderElector, Arc<AtomicBool>) {
    let reachable = Arc::new(AtomicBool::new(true));
    let elector = LeaderElector::new(
        Arc::new(FakeProvider { server: server.clone(), reachable: reachable.clone() }),
        Arc::new(workers.clone()),
    )
    .with_retry_interval(Duration::from_secs(1));
    (elector, reachable)
}

#[tokio::test(start_paused = true)]
async fn single_replica_becomes_leader_and_stops_cleanly() {
    let server = FakeLockServer::default();
    let workers = CountingWorkers::default();
    let (elector, _) = replica(&server, &workers);

    let cancel = CancellationToken::new();
    let task = tokio::spawn(elector.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(workers.active.load(Ordering::SeqCst), 1);
    assert!(server.holder().is_some());

    cancel.cancel();
    task.await.unwrap();
    assert_eq!(workers.active.load(Ordering::SeqCst), 0);
    assert!(server.holder().is_none(), "lock released on stop");
}

#[tokio::test(start_paused = true)]
async fn at_most_one_replica_leads() {
    let server = FakeLockServer::default();
    let workers = CountingWorkers::default();
    let cancel = CancellationToken::new();

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let (elector, _) = replica(&server, &workers);
        tasks.push(tokio::spawn(elector.run(cancel.clone())));
    }

    // Long enough for every replica to retry many times.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(workers.peak.load(Ordering::SeqCst), 1, "no overlapping leaderships");
    assert_eq!(workers.started.load(Ordering::SeqCst), 1);

    cancel.cancel();
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn failover_within_retry_interval() {
    let server = FakeLockServer::default();
    let workers = CountingWorkers::default();
    let cancel = CancellationToken::new();

    let (a, _) = replica(&server, &workers);
    let task_a = tokio::spawn(a.run(cancel.clone()));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(workers.started.load(Ordering::SeqCst), 1);

    let (b, _) = replica(&server, &workers);
    let task_b = tokio::spawn(b.run(cancel.clone()));
    tokio::time::sleep(Duration::from_secs(5)).await;
    // B keeps following while A holds the lock.
    assert_eq!(workers.started.load(Ordering::SeqCst), 1);

    // A's session dies without clean shutdown. B takes over within its
    // retry interval; A notices at its next lock check and stands down.
    server.kill_session();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(workers.started.load(Ordering::SeqCst), 2, "B took over");
    assert_eq!(workers.active.load(Ordering::SeqCst), 1, "exactly one leader after settling");
    assert_eq!(server.holder().is_some(), true);

    cancel.cancel();
    let _ = task_a.await;
    let _ = task_b.await;
}

#[tokio::test(start_paused = true)]
async fn acquisition_errors_are_retried() {
    let server = FakeLockServer::default();
    let workers = CountingWorkers::default();
    let (elector, reachable) = replica(&server, &workers);
    reachable.store(false, Ordering::SeqCst);

    let cancel = CancellationToken::new();
    let task = tokio::spawn(elector.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(workers.started.load(Ordering::SeqCst), 0);

    // Connectivity returns; the retry loop picks the lock up.
    reachable.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(workers.started.load(Ordering::SeqCst), 1);

    cancel.cancel();
    task.await.unwrap();
}
