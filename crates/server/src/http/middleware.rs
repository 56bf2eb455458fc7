// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API-key auth and per-IP rate limiting for the /api surface.

use super::AppState;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use smelt_core::Clock;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const API_KEY_HEADER: &str = "x-api-key";

/// Shared-secret check used when no auth plugin is configured. With no
/// API key set, the surface is open (dev mode).
pub async fn require_api_key<C: Clock>(
    State(state): State<AppState<C>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.api_key {
        let presented = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, "invalid or missing API key").into_response();
        }
    }
    next.run(request).await
}

pub async fn rate_limit<C: Clock>(
    State(state): State<AppState<C>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.limiter {
        let ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        if !limiter.allow(ip) {
            return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
        }
    }
    next.run(request).await
}

/// Per-IP token bucket: capacity and refill rate are both the configured
/// requests-per-second, so short bursts up to one second's quota pass.
pub struct RateLimiter<C: Clock> {
    rate: f64,
    clock: C,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

struct Bucket {
    tokens: f64,
    last_ms: u64,
}

impl<C: Clock> RateLimiter<C> {
    pub fn new(rate_per_second: u32, clock: C) -> Self {
        Self { rate: rate_per_second as f64, clock, buckets: Mutex::new(HashMap::new()) }
    }

    pub fn allow(&self, ip: IpAddr) -> bool {
        let now_ms = self.clock.epoch_ms();
        let mut buckets = self.buckets.lock();
        let bucket =
            buckets.entry(ip).or_insert(Bucket { tokens: self.rate, last_ms: now_ms });

        let elapsed_ms = now_ms.saturating_sub(bucket.last_ms);
        bucket.tokens =
            (bucket.tokens + elapsed_ms as f64 / 1000.0 * self.rate).min(self.rate);
        bucket.last_ms = now_ms;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
#[path = "middleware_tests.rs"]
mod tests;
