// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::{Clock, FakeClock};
use serde_json::json;
use std::time::Duration;
use yare::parameterized;

fn trigger(kind: TriggerKind, config: serde_json::Value) -> Trigger {
    Trigger {
        id: TriggerId::from_string("trg-1"),
        pipeline_id: PipelineId::from_string("pip-1"),
        kind,
        config: TriggerConfig(config),
        enabled: true,
        cooldown_seconds: 0,
        last_triggered_at: None,
        last_run_id: None,
    }
}

#[parameterized(
    landing = { "landing_zone_upload", TriggerKind::LandingZoneUpload },
    cron = { "cron", TriggerKind::Cron },
    success = { "pipeline_success", TriggerKind::PipelineSuccess },
    webhook = { "webhook", TriggerKind::Webhook },
    pattern = { "file_pattern", TriggerKind::FilePattern },
    dependency = { "cron_dependency", TriggerKind::CronDependency },
)]
fn kind_str_round_trips(s: &str, kind: TriggerKind) {
    assert_eq!(TriggerKind::parse(s), Some(kind));
    assert_eq!(kind.as_str(), s);
}

#[test]
fn config_extracts_cron_and_upstreams() {
    let config = TriggerConfig(json!({
        "cron": "0 6 * * *",
        "depends_on": ["sales.bronze.orders", "not a ref", "sales.bronze.returns"],
    }));
    assert_eq!(config.cron(), Some("0 6 * * *"));
    let ups = config.upstreams();
    assert_eq!(ups.len(), 2);
    assert_eq!(ups[0].to_string(), "sales.bronze.orders");
    assert_eq!(ups[1].to_string(), "sales.bronze.returns");
}

#[test]
fn config_with_no_dependencies_has_no_upstreams() {
    assert!(TriggerConfig(json!({})).upstreams().is_empty());
    assert!(TriggerConfig(json!({"depends_on": []})).upstreams().is_empty());
}

#[test]
fn cooldown_blocks_within_window_only() {
    let clock = FakeClock::new();
    let mut t = trigger(TriggerKind::Webhook, json!({}));
    t.cooldown_seconds = 60;

    // Never fired: no cooldown.
    assert!(!t.in_cooldown(clock.now_utc()));

    t.last_triggered_at = Some(clock.now_utc());
    clock.advance(Duration::from_secs(30));
    assert!(t.in_cooldown(clock.now_utc()));

    clock.advance(Duration::from_secs(31));
    assert!(!t.in_cooldown(clock.now_utc()));
}

#[test]
fn zero_cooldown_never_blocks() {
    let clock = FakeClock::new();
    let mut t = trigger(TriggerKind::Webhook, json!({}));
    t.last_triggered_at = Some(clock.now_utc());
    assert!(!t.in_cooldown(clock.now_utc()));
}

#[parameterized(
    cron = { TriggerKind::Cron, json!({"cron": "*/5 * * * *"}), "trigger:cron:*/5 * * * *" },
    webhook = { TriggerKind::Webhook, json!({"name": "deploy-hook"}), "trigger:webhook:deploy-hook" },
    pattern = {
        TriggerKind::FilePattern,
        json!({"zone": "inbox", "pattern": "*.csv"}),
        "trigger:file_pattern:inbox:*.csv"
    },
    upload = { TriggerKind::LandingZoneUpload, json!({"zone": "inbox"}), "trigger:landing_zone_upload:inbox" },
)]
fn labels_summarize_config(kind: TriggerKind, config: serde_json::Value, expected: &str) {
    assert_eq!(trigger(kind, config).label(), expected);
}

#[test]
fn config_serde_is_transparent() {
    let config = TriggerConfig(json!({"cron": "0 * * * *"}));
    let s = serde_json::to_string(&config).unwrap();
    assert_eq!(s, r#"{"cron":"0 * * * *"}"#);
    let back: TriggerConfig = serde_json::from_str(&s).unwrap();
    assert_eq!(back, config);
}
