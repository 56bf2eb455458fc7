// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use smelt_core::FakeClock;
use std::time::Duration;

fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
}

#[test]
fn burst_up_to_rate_then_refused() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(5, clock.clone());

    for _ in 0..5 {
        assert!(limiter.allow(ip(1)));
    }
    assert!(!limiter.allow(ip(1)));
}

#[test]
fn tokens_refill_over_time() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(2, clock.clone());

    assert!(limiter.allow(ip(1)));
    assert!(limiter.allow(ip(1)));
    assert!(!limiter.allow(ip(1)));

    clock.advance(Duration::from_millis(600));
    assert!(limiter.allow(ip(1)), "0.6s at 2/s refills more than one token");
    assert!(!limiter.allow(ip(1)));
}

#[test]
fn buckets_are_per_ip() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(1, clock.clone());

    assert!(limiter.allow(ip(1)));
    assert!(!limiter.allow(ip(1)));
    assert!(limiter.allow(ip(2)), "a hot neighbor must not starve others");
}

#[test]
fn refill_caps_at_burst_capacity() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(3, clock.clone());
    clock.advance(Duration::from_secs(3600));

    let mut allowed = 0;
    while limiter.allow(ip(1)) {
        allowed += 1;
    }
    assert_eq!(allowed, 3, "idle time never banks more than one second's quota");
}
