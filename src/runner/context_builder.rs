//! Policy-context construction
//!
//! Turns a task and an optional plan into a [`MetadataEnvelope`]: a frozen
//! copy of the plan plus the merge of plan-level and task-level metadata.
//! Both metadata maps are filtered against an allow-list first, so keys
//! such as `secret` or `__proto__` never reach the merged result.

use crate::policy::{DiffSummary, Evidence, FrozenPlan, PolicyContext};
use crate::task::Task;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::env;
use tracing::{debug, info, Level};

/// Metadata keys that may reach a policy
pub const DEFAULT_META_KEYS: [&str; 7] = [
    "intent",
    "regression_reference",
    "ticket_id",
    "risk_level",
    "component",
    "owner",
    "labels",
];

/// Names of built-in object members in the JS-style object model that
/// feeds this crate; never merged, allow-listed or not.
const RESERVED_KEYS: [&str; 13] = [
    "__proto__",
    "constructor",
    "prototype",
    "hasOwnProperty",
    "isPrototypeOf",
    "propertyIsEnumerable",
    "toString",
    "toLocaleString",
    "valueOf",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Which side wins when plan and task metadata share a key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaPrecedence {
    #[default]
    TaskOverPlan,
    PlanOverTask,
}

impl MetaPrecedence {
    pub fn from_flag(task_over_plan: bool) -> Self {
        if task_over_plan {
            Self::TaskOverPlan
        } else {
            Self::PlanOverTask
        }
    }

    /// `TASK_META_OVER_PLAN=0` selects plan-over-task; anything else keeps the default
    pub fn from_env() -> Self {
        Self::from_flag(env::var("TASK_META_OVER_PLAN").map_or(true, |v| v != "0"))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskOverPlan => "task_over_plan",
            Self::PlanOverTask => "plan_over_task",
        }
    }
}

/// Knobs for [`build_envelope`]
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSettings {
    pub precedence: MetaPrecedence,
    pub allowed_meta_keys: BTreeSet<String>,
    /// Log the merged keys and plan digest at info instead of debug
    pub debug: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            precedence: MetaPrecedence::default(),
            allowed_meta_keys: DEFAULT_META_KEYS.iter().map(|k| k.to_string()).collect(),
            debug: false,
        }
    }
}

impl ContextSettings {
    /// Defaults with `TASK_META_OVER_PLAN` and `DEBUG_POLICY_CONTEXT` applied
    pub fn from_env() -> Self {
        Self {
            precedence: MetaPrecedence::from_env(),
            debug: debug_flag(),
            ..Self::default()
        }
    }

    pub fn with_precedence(mut self, precedence: MetaPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_allowed_meta_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_meta_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

pub(crate) fn debug_flag() -> bool {
    env::var("DEBUG_POLICY_CONTEXT").map_or(false, |v| v == "1")
}

/// Output of [`build_envelope`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEnvelope {
    pub task_id: String,
    pub request_id: Option<String>,
    pub topic: Option<String>,
    pub ts: String,
    pub plan: Option<FrozenPlan>,
    pub meta: Map<String, Value>,
}

impl MetadataEnvelope {
    pub fn into_policy_context(
        self,
        diff: DiffSummary,
        evidence: Evidence,
        manual_approval: bool,
    ) -> PolicyContext {
        PolicyContext::builder(self.task_id)
            .request_id(self.request_id)
            .topic(self.topic)
            .timestamp(self.ts)
            .diff(diff)
            .evidence(evidence)
            .metadata(self.meta)
            .plan(self.plan)
            .manual_approval(manual_approval)
            .build()
    }
}

/// Freeze the plan and merge metadata under `settings`
pub fn build_envelope(
    task: &Task,
    plan: Option<&Value>,
    now: Option<DateTime<Utc>>,
    settings: &ContextSettings,
) -> MetadataEnvelope {
    let ts = now
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    let frozen = plan.map(FrozenPlan::new);

    let empty = Map::new();
    let plan_meta = sanitize_meta(
        plan.and_then(|p| p.get("metadata"))
            .and_then(Value::as_object)
            .unwrap_or(&empty),
        &settings.allowed_meta_keys,
    );
    let task_meta = sanitize_meta(&task.metadata, &settings.allowed_meta_keys);

    let mut meta = Map::new();
    match settings.precedence {
        MetaPrecedence::TaskOverPlan => {
            deep_merge_safe(&mut meta, &plan_meta);
            deep_merge_safe(&mut meta, &task_meta);
        }
        MetaPrecedence::PlanOverTask => {
            deep_merge_safe(&mut meta, &task_meta);
            deep_merge_safe(&mut meta, &plan_meta);
        }
    }

    let envelope = MetadataEnvelope {
        task_id: task.task_id.clone().unwrap_or_else(|| "unknown".to_string()),
        request_id: task.request_id.clone(),
        topic: task.topic.clone(),
        ts,
        plan: frozen,
        meta,
    };

    if settings.debug || tracing::enabled!(Level::DEBUG) {
        let keys: Vec<&str> = envelope.meta.keys().map(String::as_str).collect();
        let plan_hash = envelope.plan.as_ref().map(FrozenPlan::digest);
        if settings.debug {
            info!(precedence = settings.precedence.as_str(), ?keys, ?plan_hash, "Built policy context");
        } else {
            debug!(precedence = settings.precedence.as_str(), ?keys, ?plan_hash, "Built policy context");
        }
    }

    envelope
}

/// Keep allow-listed, non-reserved keys whose values are null, string,
/// number or bool
pub fn sanitize_meta(source: &Map<String, Value>, allowed: &BTreeSet<String>) -> Map<String, Value> {
    source
        .iter()
        .filter(|(key, _)| allowed.contains(key.as_str()) && !is_reserved_key(key))
        .filter(|(_, value)| is_plain(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_plain(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

/// Merge `source` into `target`, recursing into nested objects and
/// skipping reserved keys at every level
pub fn deep_merge_safe(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        if is_reserved_key(key) {
            continue;
        }

        match value {
            Value::Object(nested) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(existing) = slot {
                    deep_merge_safe(existing, nested);
                }
            }
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}
