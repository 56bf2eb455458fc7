// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_is_monotonic_enough() {
    let clock = SystemClock;
    let a = clock.now_utc();
    let b = clock.now_utc();
    assert!(b >= a);
}

#[test]
fn fake_clock_starts_fixed_and_advances() {
    let clock = FakeClock::new();
    let start = clock.now_utc();
    clock.advance(Duration::from_secs(90));
    assert_eq!(clock.now_utc() - start, chrono::Duration::seconds(90));
}

#[test]
fn fake_clock_set_overrides() {
    let clock = FakeClock::new();
    let when = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).single().unwrap();
    clock.set(when);
    assert_eq!(clock.now_utc(), when);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_secs(10));
    assert_eq!(clock.now_utc(), other.now_utc());
}

#[test]
fn epoch_ms_tracks_now_utc() {
    let clock = FakeClock::at(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap());
    let before = clock.epoch_ms();
    clock.advance(Duration::from_millis(1500));
    assert_eq!(clock.epoch_ms() - before, 1500);
}
