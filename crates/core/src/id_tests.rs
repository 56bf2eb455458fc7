// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{PipelineId, RunId};

#[test]
fn generated_ids_have_prefix_and_fixed_length() {
    let id = RunId::new();
    assert!(id.as_str().starts_with("run-"));
    assert_eq!(id.as_str().len(), ID_LEN);
}

#[test]
fn generated_ids_are_unique() {
    let a = RunId::new();
    let b = RunId::new();
    assert_ne!(a, b);
}

#[test]
fn from_string_round_trips() {
    let id = RunId::from_string("run-abc123");
    assert_eq!(id, "run-abc123");
    assert_eq!(id.to_string(), "run-abc123");
}

#[test]
fn serde_round_trips_as_plain_string() {
    let id = PipelineId::from_string("pip-xyz");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"pip-xyz\"");
    let back: PipelineId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn deserialize_rejects_oversized_ids() {
    let long = format!("\"{}\"", "x".repeat(ID_LEN + 1));
    assert!(serde_json::from_str::<RunId>(&long).is_err());
}

#[test]
fn idbuf_hash_matches_str_hash() {
    use std::collections::HashMap;
    let mut map: HashMap<RunId, u32> = HashMap::new();
    map.insert(RunId::from_string("run-1"), 7);
    // Borrow<str> lookup must find the entry inserted under the typed key.
    assert_eq!(map.get("run-1"), Some(&7));
}

#[test]
fn empty_id_is_empty() {
    let id = RunId::from_string("");
    assert!(id.is_empty());
}
