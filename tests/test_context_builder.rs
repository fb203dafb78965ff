//! Policy context construction tests
//!
//! Metadata precedence in both directions, allow-list filtering and the
//! frozen plan snapshot.

use chrono::{TimeZone, Utc};
use serde_json::json;
use taskgate::runner::{build_envelope, ContextSettings, MetaPrecedence};
use taskgate::task::Task;

fn task_with_meta() -> taskgate::task::Task {
    Task::from_value(&json!({
        "task_id": "t-1",
        "requestId": "req-1",
        "topic": "ops",
        "intent": "bugfix",
        "metadata": {
            "intent": "bugfix",
            "owner": "task-owner",
            "secret": "hunter2",
            "__proto__": "polluted",
            "labels": ["a", "b"]
        }
    }))
}

fn plan() -> serde_json::Value {
    json!({
        "steps": [{"id": "s1"}],
        "metadata": {
            "owner": "plan-owner",
            "component": "router",
            "constructor": "polluted"
        }
    })
}

#[test]
fn test_task_metadata_wins_by_default() {
    let settings = ContextSettings::default();
    let envelope = build_envelope(&task_with_meta(), Some(&plan()), None, &settings);

    assert_eq!(envelope.meta["owner"], "task-owner");
    assert_eq!(envelope.meta["component"], "router");
    assert_eq!(envelope.meta["intent"], "bugfix");
}

#[test]
fn test_plan_metadata_wins_when_configured() {
    let settings = ContextSettings::default().with_precedence(MetaPrecedence::PlanOverTask);
    let envelope = build_envelope(&task_with_meta(), Some(&plan()), None, &settings);

    assert_eq!(envelope.meta["owner"], "plan-owner");
    assert_eq!(envelope.meta["intent"], "bugfix");
}

#[test]
fn test_disallowed_reserved_and_structured_values_dropped() {
    let envelope = build_envelope(
        &task_with_meta(),
        Some(&plan()),
        None,
        &ContextSettings::default(),
    );

    for dropped in ["secret", "__proto__", "constructor", "labels"] {
        assert!(
            !envelope.meta.contains_key(dropped),
            "{dropped} should not reach the policy context"
        );
    }
}

#[test]
fn test_reserved_keys_rejected_even_when_allow_listed() {
    let settings = ContextSettings::default().with_allowed_meta_keys(["owner", "__proto__"]);
    let envelope = build_envelope(&task_with_meta(), None, None, &settings);

    assert_eq!(envelope.meta.len(), 1);
    assert_eq!(envelope.meta["owner"], "task-owner");
}

#[test]
fn test_plan_snapshot_is_detached_from_caller() {
    let mut caller_plan = plan();
    let envelope = build_envelope(
        &task_with_meta(),
        Some(&caller_plan),
        None,
        &ContextSettings::default(),
    );

    caller_plan["steps"]
        .as_array_mut()
        .unwrap()
        .push(json!({"id": "s2"}));

    let frozen = envelope.plan.as_ref().unwrap();
    assert_eq!(frozen["steps"].as_array().unwrap().len(), 1);

    // A writable copy is detached from the snapshot too
    let mut copy = frozen.to_owned_value();
    copy["steps"] = json!([]);
    assert_eq!(frozen["steps"].as_array().unwrap().len(), 1);
}

#[test]
fn test_plan_digest_is_stable() {
    let settings = ContextSettings::default();
    let first = build_envelope(&task_with_meta(), Some(&plan()), None, &settings);
    let second = build_envelope(&task_with_meta(), Some(&plan()), None, &settings);

    let digest = first.plan.as_ref().unwrap().digest();
    assert_eq!(digest.len(), 8);
    assert_eq!(digest, second.plan.as_ref().unwrap().digest());
}

#[test]
fn test_envelope_fields_and_policy_context() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
    let envelope = build_envelope(&task_with_meta(), None, Some(now), &ContextSettings::default());

    assert_eq!(envelope.task_id, "t-1");
    assert_eq!(envelope.request_id.as_deref(), Some("req-1"));
    assert_eq!(envelope.ts, "2024-05-01T12:30:00.000Z");
    assert!(envelope.plan.is_none());

    let serialized = serde_json::to_value(&envelope).unwrap();
    assert_eq!(serialized["taskId"], "t-1");
    assert_eq!(serialized["requestId"], "req-1");

    let context = envelope.into_policy_context(Default::default(), Default::default(), true);
    assert_eq!(context.task_id(), "t-1");
    assert_eq!(context.topic(), Some("ops"));
    assert_eq!(context.intent(), Some("bugfix"));
    assert!(context.manual_approval());
}

#[test]
fn test_missing_task_id_is_unknown() {
    let envelope = build_envelope(&Task::new("x"), None, None, &ContextSettings::default());
    assert_eq!(envelope.task_id, "unknown");
    assert!(envelope.meta.is_empty());
}
