// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::dispatch::WarmPoolDispatcher;
use crate::worker::mock::MockWorker;
use smelt_core::{
    FakeClock, Layer, PipelineId, PipelineKind, RetentionOverride, RunStatus, ScheduleId,
};
use smelt_storage::mem::MemStore;
use smelt_storage::RunUpdate;
use std::time::Duration as StdDuration;

struct Harness {
    store: MemStore,
    clock: FakeClock,
    dispatcher: Arc<WarmPoolDispatcher<FakeClock>>,
    scheduler: Scheduler<FakeClock>,
}

fn harness(capacity: u32) -> Harness {
    let store = MemStore::new();
    let clock = FakeClock::new();
    let dispatcher = Arc::new(WarmPoolDispatcher::new(
        Arc::new(MockWorker::new(capacity)),
        Arc::new(store.clone()),
        clock.clone(),
    ));
    let scheduler = Scheduler::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        dispatcher.clone(),
        clock.clone(),
    );
    Harness { store, clock, dispatcher, scheduler }
}

fn insert_pipeline(h: &Harness, id: &str) {
    h.store.insert_pipeline(Pipeline {
        id: PipelineId::from_string(id),
        namespace: "sales".into(),
        layer: Layer::Bronze,
        name: id.to_string(),
        kind: PipelineKind::Sql,
        deleted_at: None,
        retention: RetentionOverride::default(),
    });
}

fn insert_schedule(h: &Harness, id: &str, pipeline: &str, cron: &str, next_offset_secs: Option<i64>) {
    h.store.insert_schedule(Schedule {
        id: ScheduleId::from_string(id),
        pipeline_id: PipelineId::from_string(pipeline),
        cron: cron.to_string(),
        enabled: true,
        last_run_id: None,
        last_run_at: None,
        next_run_at: next_offset_secs
            .map(|secs| h.clock.now_utc() + chrono::Duration::seconds(secs)),
    });
}

#[tokio::test]
async fn catch_up_once_fires_exactly_one_run() {
    let h = harness(4);
    insert_pipeline(&h, "pip-1");
    // Due for three hours: one catch-up firing, not three.
    insert_schedule(&h, "sch-1", "pip-1", "0 * * * *", Some(-3 * 3600));

    h.scheduler.tick().await;

    let runs = h.store.all_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].trigger, "schedule:0 * * * *");

    let schedule = h.store.schedule(&ScheduleId::from_string("sch-1")).unwrap();
    assert!(schedule.next_run_at.unwrap() > h.clock.now_utc());
    assert_eq!(schedule.last_run_id.unwrap(), runs[0].id);

    // Nothing more happens while the next boundary is in the future.
    h.scheduler.tick().await;
    h.scheduler.tick().await;
    assert_eq!(h.store.run_count(), 1);
}

#[tokio::test]
async fn overlapping_ticks_with_frozen_time_fire_at_most_once() {
    let h = harness(4);
    insert_pipeline(&h, "pip-1");
    insert_schedule(&h, "sch-1", "pip-1", "* * * * *", Some(-60));

    // Run completes instantly so the active-run skip is not what dedupes.
    h.scheduler.tick().await;
    let first = h.store.all_runs();
    assert_eq!(first.len(), 1);
    h.dispatcher
        .complete(&first[0].id, crate::dispatch::RunOutcome::success())
        .await
        .unwrap();

    h.scheduler.tick().await;
    assert_eq!(h.store.run_count(), 1, "advanced next_run_at suppresses refiring");
}

#[tokio::test]
async fn uninitialized_schedule_initializes_without_firing() {
    let h = harness(4);
    insert_pipeline(&h, "pip-1");
    insert_schedule(&h, "sch-1", "pip-1", "*/5 * * * *", None);

    h.scheduler.tick().await;

    assert_eq!(h.store.run_count(), 0);
    let schedule = h.store.schedule(&ScheduleId::from_string("sch-1")).unwrap();
    assert!(schedule.next_run_at.unwrap() > h.clock.now_utc());
}

#[tokio::test]
async fn future_schedule_is_skipped() {
    let h = harness(4);
    insert_pipeline(&h, "pip-1");
    insert_schedule(&h, "sch-1", "pip-1", "0 * * * *", Some(3600));

    h.scheduler.tick().await;
    assert_eq!(h.store.run_count(), 0);
}

#[tokio::test]
async fn invalid_cron_is_logged_and_skipped() {
    let h = harness(4);
    insert_pipeline(&h, "pip-1");
    insert_schedule(&h, "sch-1", "pip-1", "every full moon", Some(-60));

    h.scheduler.tick().await;

    assert_eq!(h.store.run_count(), 0);
    let schedule = h.store.schedule(&ScheduleId::from_string("sch-1")).unwrap();
    assert!(schedule.last_run_id.is_none());
}

#[tokio::test]
async fn running_pipeline_skips_without_advancing() {
    let h = harness(4);
    insert_pipeline(&h, "pip-1");
    insert_schedule(&h, "sch-1", "pip-1", "0 * * * *", Some(-60));

    // Pipeline already has a running run.
    let mut active = Run::new(
        RunId::from_string("run-live"),
        PipelineId::from_string("pip-1"),
        "manual",
        h.clock.now_utc(),
    );
    active.transition(RunStatus::Running, h.clock.now_utc()).unwrap();
    h.store.insert_run(active);

    let due_at = h.store.schedule(&ScheduleId::from_string("sch-1")).unwrap().next_run_at;
    h.scheduler.tick().await;

    assert_eq!(h.store.run_count(), 1, "no new run while one is active");
    let schedule = h.store.schedule(&ScheduleId::from_string("sch-1")).unwrap();
    assert_eq!(schedule.next_run_at, due_at, "schedule not advanced");

    // The running run terminates; the next tick fires and advances.
    smelt_storage::RunStore::update_status(
        &h.store,
        &RunId::from_string("run-live"),
        RunUpdate::to(RunStatus::Success),
        h.clock.now_utc(),
    )
    .await
    .unwrap();
    h.scheduler.tick().await;

    assert_eq!(h.store.run_count(), 2);
    let schedule = h.store.schedule(&ScheduleId::from_string("sch-1")).unwrap();
    assert!(schedule.next_run_at.unwrap() > h.clock.now_utc());
}

#[tokio::test]
async fn worker_busy_retries_admission_next_tick() {
    let h = harness(1);
    insert_pipeline(&h, "pip-0");
    insert_pipeline(&h, "pip-1");
    insert_schedule(&h, "sch-1", "pip-1", "0 * * * *", Some(-60));

    // Saturate the single slot with another pipeline's run.
    let blocker = Run::new(
        RunId::from_string("run-blocker"),
        PipelineId::from_string("pip-0"),
        "manual",
        h.clock.now_utc(),
    );
    h.store.insert_run(blocker.clone());
    let blocker_pipeline = smelt_storage::PipelineStore::get(
        &h.store,
        &PipelineId::from_string("pip-0"),
    )
    .await
    .unwrap()
    .unwrap();
    h.dispatcher.submit(&blocker, &blocker_pipeline).await.unwrap();

    let due_at = h.store.schedule(&ScheduleId::from_string("sch-1")).unwrap().next_run_at;
    h.scheduler.tick().await;

    // Run row exists and stays pending; the schedule is not advanced.
    let runs = h.store.all_runs();
    let scheduled: Vec<_> =
        runs.iter().filter(|r| r.trigger.starts_with("schedule:")).collect();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].status, RunStatus::Pending);
    let schedule = h.store.schedule(&ScheduleId::from_string("sch-1")).unwrap();
    assert_eq!(schedule.next_run_at, due_at);

    // Still busy on the next tick: no duplicate run is created.
    h.scheduler.tick().await;
    assert_eq!(h.store.run_count(), 2);

    // Free the slot; the pending run is re-submitted, not recreated.
    h.dispatcher.complete(&blocker.id, crate::dispatch::RunOutcome::success()).await.unwrap();
    h.scheduler.tick().await;

    let runs = h.store.all_runs();
    let scheduled: Vec<_> =
        runs.iter().filter(|r| r.trigger.starts_with("schedule:")).collect();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].status, RunStatus::Running);
    let schedule = h.store.schedule(&ScheduleId::from_string("sch-1")).unwrap();
    assert!(schedule.next_run_at.unwrap() > h.clock.now_utc());
    assert_eq!(schedule.last_run_id.unwrap(), scheduled[0].id);
}

#[tokio::test]
async fn missed_schedule_fires_on_first_due_tick_with_future_next() {
    let h = harness(4);
    insert_pipeline(&h, "pip-1");
    insert_schedule(&h, "sch-1", "pip-1", "*/5 * * * *", Some(-7 * 24 * 3600));

    h.clock.advance(StdDuration::from_secs(17));
    h.scheduler.tick().await;

    assert_eq!(h.store.run_count(), 1);
    let schedule = h.store.schedule(&ScheduleId::from_string("sch-1")).unwrap();
    let next = schedule.next_run_at.unwrap();
    assert!(next > h.clock.now_utc());
    // Strictly later than now, but within one cadence.
    assert!(next - h.clock.now_utc() <= chrono::Duration::minutes(5));
}
