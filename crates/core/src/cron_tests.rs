// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::{Clock, FakeClock};
use std::time::Duration;
use yare::parameterized;

#[parameterized(
    every_minute = { "* * * * *" },
    hourly = { "0 * * * *" },
    daily = { "0 6 * * *" },
    every_five = { "*/5 * * * *" },
    weekday = { "30 9 * * 1-5" },
)]
fn parses_valid_expressions(expr: &str) {
    let cron = CronSchedule::parse(expr).unwrap();
    assert_eq!(cron.expression(), expr);
}

#[parameterized(
    empty = { "" },
    words = { "every five minutes" },
    bad_field = { "61 * * * *" },
)]
fn rejects_invalid_expressions(expr: &str) {
    assert!(CronSchedule::parse(expr).is_err());
}

#[test]
fn next_is_strictly_after_input() {
    let clock = FakeClock::new();
    let cron = CronSchedule::parse("* * * * *").unwrap();
    let now = clock.now_utc();
    let next = cron.next_after(now).unwrap();
    assert!(next > now);
    // Every-minute cron fires within the next minute.
    assert!(next - now <= chrono::Duration::seconds(60));
}

#[test]
fn next_is_idempotent_for_fixed_input() {
    let cron = CronSchedule::parse("0 * * * *").unwrap();
    let now = FakeClock::new().now_utc();
    assert_eq!(cron.next_after(now), cron.next_after(now));
}

#[test]
fn stepping_is_monotonic() {
    let cron = CronSchedule::parse("*/5 * * * *").unwrap();
    let mut t = FakeClock::new().now_utc();
    for _ in 0..10 {
        let next = cron.next_after(t).unwrap();
        assert!(next > t);
        t = next;
    }
}

#[test]
fn due_since_sees_missed_occurrences() {
    let clock = FakeClock::new();
    let cron = CronSchedule::parse("0 * * * *").unwrap();
    let now = clock.now_utc();

    // Last fired three hours ago: at least one boundary was crossed.
    assert!(cron.due_since(now - chrono::Duration::hours(3), now));
    // Just fired moments ago: not due.
    clock.advance(Duration::from_secs(1));
    assert!(!cron.due_since(now, clock.now_utc()));
}
