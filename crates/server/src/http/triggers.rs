// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Externally-fired triggers: webhooks and landing-zone file arrivals.

use super::AppState;
use crate::evaluator::FireOutcome;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use smelt_core::{Clock, TriggerId, TriggerKind};
use smelt_storage::TriggerStore;

#[derive(Deserialize)]
pub struct WebhookBody {
    token: String,
}

fn fire_response(outcome: FireOutcome) -> Response {
    match outcome {
        FireOutcome::Fired(run_id) => {
            (StatusCode::ACCEPTED, Json(json!({"run_id": run_id.as_str()}))).into_response()
        }
        FireOutcome::Busy => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "worker busy"})))
                .into_response()
        }
        FireOutcome::Cooldown => {
            (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": "trigger in cooldown"})))
                .into_response()
        }
        FireOutcome::Disabled => {
            (StatusCode::CONFLICT, Json(json!({"error": "trigger disabled"}))).into_response()
        }
    }
}

/// POST /api/triggers/:id/webhook: authenticate the presented token
/// against the trigger's stored hash, then fire.
pub async fn webhook<C: Clock>(
    State(state): State<AppState<C>>,
    Path(trigger_id): Path<String>,
    Json(body): Json<WebhookBody>,
) -> Response {
    let trigger = match state.triggers.get(&TriggerId::from_string(&trigger_id)).await {
        Ok(Some(trigger)) if trigger.kind == TriggerKind::Webhook => trigger,
        Ok(_) => {
            return (StatusCode::NOT_FOUND, Json(json!({"error": "webhook trigger not found"})))
                .into_response()
        }
        Err(error) => {
            tracing::error!(%error, "trigger lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"})))
                .into_response();
        }
    };

    let presented = format!("{:x}", Sha256::digest(body.token.as_bytes()));
    if trigger.config.token_hash() != Some(presented.as_str()) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid token"})))
            .into_response();
    }

    match state.evaluator.fire_external(&trigger).await {
        Ok(outcome) => fire_response(outcome),
        Err(error) => {
            tracing::error!(%error, "webhook firing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"})))
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct FileUploadedBody {
    path: String,
}

/// POST /api/zones/:name/files: a file arrived in a landing zone; fire
/// the zone's upload triggers and any matching file-pattern triggers.
pub async fn file_uploaded<C: Clock>(
    State(state): State<AppState<C>>,
    Path(zone): Path<String>,
    Json(body): Json<FileUploadedBody>,
) -> Response {
    match state.evaluator.on_file_uploaded(&zone, &body.path).await {
        Ok(run_ids) => {
            let ids: Vec<&str> = run_ids.iter().map(|id| id.as_str()).collect();
            (StatusCode::ACCEPTED, Json(json!({"run_ids": ids}))).into_response()
        }
        Err(error) => {
            tracing::error!(%error, "file-upload trigger evaluation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"})))
                .into_response()
        }
    }
}
