// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: health, run submission and progress, trigger firing.
//!
//! This is the thin edge of the kernel. Submissions surface one of three
//! outcomes: accepted (202, the run exists and dispatch is in progress),
//! admission refusal (503, worker busy, caller retries), or a hard
//! failure. The healthz route is unauthenticated; everything under /api
//! goes through the API-key and rate-limit middleware.

mod middleware;
mod runs;
mod triggers;

pub use middleware::RateLimiter;

use crate::dispatch::Dispatcher;
use crate::evaluator::Evaluator;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use smelt_core::Clock;
use smelt_storage::{AuditStore, PipelineStore, RunStore, TriggerStore};
use std::sync::Arc;

pub struct AppState<C: Clock> {
    pub runs: Arc<dyn RunStore>,
    pub pipelines: Arc<dyn PipelineStore>,
    pub triggers: Arc<dyn TriggerStore>,
    pub audit: Arc<dyn AuditStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub evaluator: Arc<Evaluator<C>>,
    pub clock: C,
    pub api_key: Option<String>,
    pub limiter: Option<Arc<RateLimiter<C>>>,
    /// Query sidecar endpoint; readiness passes its health through.
    pub query_addr: Option<String>,
}

impl<C: Clock> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            runs: Arc::clone(&self.runs),
            pipelines: Arc::clone(&self.pipelines),
            triggers: Arc::clone(&self.triggers),
            audit: Arc::clone(&self.audit),
            dispatcher: Arc::clone(&self.dispatcher),
            evaluator: Arc::clone(&self.evaluator),
            clock: self.clock.clone(),
            api_key: self.api_key.clone(),
            limiter: self.limiter.clone(),
            query_addr: self.query_addr.clone(),
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

/// Readiness: pass through the query sidecar's health when one is
/// configured. The probe uses the caller's deadline, no internal timeout.
async fn readyz<C: Clock>(State(state): State<AppState<C>>) -> StatusCode {
    let Some(query_addr) = &state.query_addr else {
        return StatusCode::OK;
    };
    let url = format!("{}/healthz", query_addr.trim_end_matches('/'));
    match reqwest::get(&url).await {
        Ok(response) if response.status().is_success() => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Full router: health plus the API surface.
pub fn router<C: Clock>(state: AppState<C>) -> Router {
    let api = Router::new()
        .route("/pipelines/:id/runs", post(runs::submit::<C>))
        .route("/runs/:id/cancel", post(runs::cancel::<C>))
        .route("/runs/:id/complete", post(runs::complete::<C>))
        .route("/triggers/:id/webhook", post(triggers::webhook::<C>))
        .route("/zones/:name/files", post(triggers::file_uploaded::<C>))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_api_key::<C>,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::<C>,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz::<C>))
        .nest("/api", api)
        .with_state(state)
}

/// Stateless replicas (no DATABASE_URL) expose health and nothing else.
pub fn stateless_router() -> Router {
    Router::new().route("/healthz", get(healthz))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
