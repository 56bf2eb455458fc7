// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn run_completed_round_trips() {
    let event = RunCompleted {
        run_id: RunId::from_string("run-abc"),
        pipeline_id: PipelineId::from_string("pip-xyz"),
        status: RunStatus::Success,
    };
    let payload = event.encode();
    let back = RunCompleted::decode(&payload).unwrap();
    assert_eq!(back, event);
}

#[test]
fn statuses_serialize_lowercase() {
    let event = RunCompleted {
        run_id: RunId::from_string("run-1"),
        pipeline_id: PipelineId::from_string("pip-1"),
        status: RunStatus::Failed,
    };
    assert!(event.encode().contains("\"failed\""));
}

#[test]
fn decode_rejects_garbage() {
    assert!(RunCompleted::decode("not json").is_err());
    assert!(RunCompleted::decode("{}").is_err());
}
