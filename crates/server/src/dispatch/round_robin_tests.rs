// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::super::*;
use crate::worker::mock::MockWorker;
use smelt_core::{
    Clock, FakeClock, Layer, Pipeline, PipelineId, PipelineKind, RetentionOverride, Run, RunId,
    RunStatus,
};
use smelt_storage::mem::MemStore;
use smelt_storage::RunStore;
use std::sync::Arc;

fn pipeline(id: &str) -> Pipeline {
    Pipeline {
        id: PipelineId::from_string(id),
        namespace: "sales".into(),
        layer: Layer::Bronze,
        name: "orders".into(),
        kind: PipelineKind::Sql,
        deleted_at: None,
        retention: RetentionOverride::default(),
    }
}

struct Harness {
    store: MemStore,
    workers: Vec<MockWorker>,
    clock: FakeClock,
    dispatcher: RoundRobinDispatcher<FakeClock>,
}

fn harness(capacities: &[u32]) -> Harness {
    let store = MemStore::new();
    let clock = FakeClock::new();
    let workers: Vec<MockWorker> = capacities
        .iter()
        .enumerate()
        .map(|(i, cap)| MockWorker::named(*cap, &format!("mock://w{i}")))
        .collect();
    let members = workers
        .iter()
        .map(|w| {
            Arc::new(WarmPoolDispatcher::new(
                Arc::new(w.clone()),
                Arc::new(store.clone()),
                clock.clone(),
            ))
        })
        .collect();
    Harness { store, workers, clock, dispatcher: RoundRobinDispatcher::new(members) }
}

fn pending_run(h: &Harness, id: &str) -> Run {
    let run = Run::new(
        RunId::from_string(id),
        PipelineId::from_string("pip-1"),
        "trigger:webhook:hook",
        h.clock.now_utc(),
    );
    h.store.insert_run(run.clone());
    run
}

#[tokio::test]
async fn busy_member_is_skipped_for_free_one() {
    let h = harness(&[1, 1]);

    // Saturate the first member.
    let first = pending_run(&h, "run-1");
    h.dispatcher.submit(&first, &pipeline("pip-1")).await.unwrap();

    // Next submit lands on the other worker regardless of rotation.
    let second = pending_run(&h, "run-2");
    h.dispatcher.submit(&second, &pipeline("pip-1")).await.unwrap();

    let total: usize =
        h.workers.iter().map(|w| w.dispatched().len()).sum();
    assert_eq!(total, 2);
    assert!(h.workers.iter().all(|w| w.dispatched().len() == 1));
}

#[tokio::test]
async fn all_busy_returns_worker_busy_and_frees_after_completion() {
    let h = harness(&[1, 1]);
    let a = pending_run(&h, "run-1");
    let b = pending_run(&h, "run-2");
    h.dispatcher.submit(&a, &pipeline("pip-1")).await.unwrap();
    h.dispatcher.submit(&b, &pipeline("pip-1")).await.unwrap();

    let c = pending_run(&h, "run-3");
    let err = h.dispatcher.submit(&c, &pipeline("pip-1")).await.unwrap_err();
    assert!(matches!(err, DispatchError::WorkerBusy));
    let stored = RunStore::get(&h.store, &c.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Pending);

    // A completion frees a slot somewhere in the pool.
    h.dispatcher.complete(&a.id, RunOutcome::success()).await.unwrap();
    h.dispatcher.submit(&c, &pipeline("pip-1")).await.unwrap();
    let stored = RunStore::get(&h.store, &c.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Running);
}

#[tokio::test]
async fn rotation_spreads_runs_across_members() {
    let h = harness(&[4, 4]);
    for i in 0..4 {
        let run = pending_run(&h, &format!("run-{i}"));
        h.dispatcher.submit(&run, &pipeline("pip-1")).await.unwrap();
    }
    assert_eq!(h.workers[0].dispatched().len(), 2);
    assert_eq!(h.workers[1].dispatched().len(), 2);
}

#[tokio::test]
async fn complete_routes_to_owning_member() {
    let h = harness(&[1, 1]);
    let a = pending_run(&h, "run-1");
    let b = pending_run(&h, "run-2");
    h.dispatcher.submit(&a, &pipeline("pip-1")).await.unwrap();
    h.dispatcher.submit(&b, &pipeline("pip-1")).await.unwrap();

    h.dispatcher.complete(&b.id, RunOutcome::success()).await.unwrap();

    // Exactly one slot was released: a third run fits, a fourth does not.
    let c = pending_run(&h, "run-3");
    h.dispatcher.submit(&c, &pipeline("pip-1")).await.unwrap();
    let d = pending_run(&h, "run-4");
    assert!(matches!(
        h.dispatcher.submit(&d, &pipeline("pip-1")).await.unwrap_err(),
        DispatchError::WorkerBusy
    ));
}

#[tokio::test]
async fn transport_error_stops_the_pass() {
    let h = harness(&[1, 1]);
    for w in &h.workers {
        w.push_reply(Err("boom".into()));
    }
    let run = pending_run(&h, "run-1");
    let err = h.dispatcher.submit(&run, &pipeline("pip-1")).await.unwrap_err();
    assert!(matches!(err, DispatchError::Transport(_)));

    // Exactly one member failed the run; the other was never tried.
    let stored = RunStore::get(&h.store, &run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    let remaining: usize = h
        .workers
        .iter()
        .map(|w| if w.dispatched().is_empty() { 0 } else { 1 })
        .sum();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn empty_pool_reports_busy() {
    let clock = FakeClock::new();
    let dispatcher: RoundRobinDispatcher<FakeClock> = RoundRobinDispatcher::new(vec![]);
    let run = Run::new(
        RunId::from_string("run-1"),
        PipelineId::from_string("pip-1"),
        "manual",
        clock.now_utc(),
    );
    assert!(matches!(
        dispatcher.submit(&run, &pipeline("pip-1")).await.unwrap_err(),
        DispatchError::WorkerBusy
    ));
}
