// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run submission, cancellation, and the worker progress callback.

use super::AppState;
use crate::dispatch::{DispatchError, RunOutcome};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use smelt_core::{Clock, PipelineId, Run, RunId, RunStatus};
use smelt_storage::{AuditStore, PipelineStore, RunStore};

/// Best-effort audit entry; failures never affect the request outcome.
async fn audit<C: Clock>(state: &AppState<C>, action: &str, detail: &str) {
    if let Err(error) = state.audit.append(action, detail, state.clock.now_utc()).await {
        tracing::warn!(action, %error, "failed to append audit entry");
    }
}

fn dispatch_failure(error: DispatchError) -> Response {
    match error {
        DispatchError::WorkerBusy => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "worker busy"})))
                .into_response()
        }
        DispatchError::RunNotFound(run_id) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("run {run_id} not found")})),
        )
            .into_response(),
        DispatchError::NotTerminal(status) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("status {status} is not terminal")})),
        )
            .into_response(),
        DispatchError::Transport(message) => {
            (StatusCode::BAD_GATEWAY, Json(json!({"error": message}))).into_response()
        }
        DispatchError::Store(error) => {
            tracing::error!(%error, "store failure in run endpoint");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"})))
                .into_response()
        }
    }
}

/// POST /api/pipelines/:id/runs: manual submission.
pub async fn submit<C: Clock>(
    State(state): State<AppState<C>>,
    Path(pipeline_id): Path<String>,
) -> Response {
    let pipeline_id = PipelineId::from_string(&pipeline_id);
    let pipeline = match state.pipelines.get(&pipeline_id).await {
        Ok(Some(pipeline)) => pipeline,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, Json(json!({"error": "pipeline not found"})))
                .into_response()
        }
        Err(error) => {
            tracing::error!(%error, "pipeline lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"})))
                .into_response();
        }
    };

    let run = Run::new(RunId::new(), pipeline_id, "manual", state.clock.now_utc());
    if let Err(error) = state.runs.create(&run).await {
        tracing::error!(%error, "run creation failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"})))
            .into_response();
    }

    audit(&state, "run.submit", run.id.as_str()).await;

    match state.dispatcher.submit(&run, &pipeline).await {
        Ok(()) => {
            (StatusCode::ACCEPTED, Json(json!({"run_id": run.id.as_str()}))).into_response()
        }
        // The run row exists and stays pending; the caller retries.
        Err(DispatchError::WorkerBusy) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "worker busy", "run_id": run.id.as_str()})),
        )
            .into_response(),
        Err(error) => dispatch_failure(error),
    }
}

/// POST /api/runs/:id/cancel
pub async fn cancel<C: Clock>(
    State(state): State<AppState<C>>,
    Path(run_id): Path<String>,
) -> Response {
    match state.dispatcher.cancel(&RunId::from_string(&run_id)).await {
        Ok(()) => {
            audit(&state, "run.cancel", &run_id).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(error) => dispatch_failure(error),
    }
}

#[derive(Deserialize)]
pub struct CompleteBody {
    status: String,
    duration_ms: Option<i64>,
    rows_written: Option<i64>,
    error: Option<String>,
    log_path: Option<String>,
}

/// POST /api/runs/:id/complete: worker progress callback naming a
/// terminal status.
pub async fn complete<C: Clock>(
    State(state): State<AppState<C>>,
    Path(run_id): Path<String>,
    Json(body): Json<CompleteBody>,
) -> Response {
    let Some(status) = RunStatus::parse(&body.status) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("unknown status {:?}", body.status)})),
        )
            .into_response();
    };

    let outcome = RunOutcome {
        status,
        duration_ms: body.duration_ms,
        rows_written: body.rows_written,
        error: body.error,
        log_path: body.log_path,
    };
    match state.dispatcher.complete(&RunId::from_string(&run_id), outcome).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => dispatch_failure(error),
    }
}
