// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use smelt_core::RUN_COMPLETED_CHANNEL;

fn bus() -> EventBus {
    // Lazy pool: no connection is made unless publish is called, which
    // these tests never do.
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .unwrap();
    EventBus::new(pool, &[RUN_COMPLETED_CHANNEL])
}

#[tokio::test]
async fn dispatch_reaches_subscriber_in_order() {
    let bus = bus();
    let (mut rx, _sub) = bus.subscribe(RUN_COMPLETED_CHANNEL);

    bus.dispatch(RUN_COMPLETED_CHANNEL, "one");
    bus.dispatch(RUN_COMPLETED_CHANNEL, "two");
    bus.dispatch(RUN_COMPLETED_CHANNEL, "three");

    assert_eq!(rx.recv().await.unwrap(), "one");
    assert_eq!(rx.recv().await.unwrap(), "two");
    assert_eq!(rx.recv().await.unwrap(), "three");
}

#[tokio::test]
async fn dispatch_fans_out_to_all_subscribers() {
    let bus = bus();
    let (mut a, _sa) = bus.subscribe(RUN_COMPLETED_CHANNEL);
    let (mut b, _sb) = bus.subscribe(RUN_COMPLETED_CHANNEL);

    bus.dispatch(RUN_COMPLETED_CHANNEL, "event");
    assert_eq!(a.recv().await.unwrap(), "event");
    assert_eq!(b.recv().await.unwrap(), "event");
}

#[tokio::test]
async fn channels_are_isolated() {
    let bus = bus();
    let (mut rx, _sub) = bus.subscribe(RUN_COMPLETED_CHANNEL);

    bus.dispatch("other_channel", "noise");
    bus.dispatch(RUN_COMPLETED_CHANNEL, "signal");
    assert_eq!(rx.recv().await.unwrap(), "signal");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn full_subscriber_drops_events_but_stays_subscribed() {
    let bus = bus();
    let (mut rx, _sub) = bus.subscribe(RUN_COMPLETED_CHANNEL);

    for i in 0..(SUBSCRIBER_BUFFER + 10) {
        bus.dispatch(RUN_COMPLETED_CHANNEL, &format!("event-{i}"));
    }

    // The first BUFFER events survive in order; the overflow was dropped.
    for i in 0..SUBSCRIBER_BUFFER {
        assert_eq!(rx.recv().await.unwrap(), format!("event-{i}"));
    }
    assert!(rx.try_recv().is_err());

    // Still subscribed: new events arrive once there is room.
    bus.dispatch(RUN_COMPLETED_CHANNEL, "after-overflow");
    assert_eq!(rx.recv().await.unwrap(), "after-overflow");
}

#[tokio::test]
async fn cancelled_subscription_stops_delivery() {
    let bus = bus();
    let (mut rx, sub) = bus.subscribe(RUN_COMPLETED_CHANNEL);
    sub.cancel();

    bus.dispatch(RUN_COMPLETED_CHANNEL, "event");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn dropped_receiver_is_pruned_on_next_dispatch() {
    let bus = bus();
    let (rx, _sub) = bus.subscribe(RUN_COMPLETED_CHANNEL);
    drop(rx);

    // First dispatch prunes; the registry no longer holds the subscriber.
    bus.dispatch(RUN_COMPLETED_CHANNEL, "event");
    let count = bus.inner.subscribers.lock().get(RUN_COMPLETED_CHANNEL).map(|l| l.len());
    assert_eq!(count, Some(0));
}
