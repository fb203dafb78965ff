//! Task model
//!
//! Tasks arrive as open JSON maps. [`Task::from_value`] normalizes them
//! leniently: unknown fields are ignored, `confidence` accepts numbers or
//! numeric strings (anything else is `0`), `artifacts` accepts a single
//! string or a list, and both `threadStateId` and `thread_state_id` are
//! accepted.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static FLOAT_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("float prefix pattern is valid")
});

/// A unit of work submitted for routing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Task {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    pub confidence: f64,
    pub artifacts: Vec<String>,
    #[serde(rename = "threadStateId", skip_serializing_if = "Option::is_none")]
    pub thread_state_id: Option<String>,
    pub metadata: Map<String, Value>,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,
}

impl Task {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: Some(intent.into()),
            ..Default::default()
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_artifacts<I, S>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artifacts = artifacts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_thread_state_id(mut self, thread_state_id: impl Into<String>) -> Self {
        self.thread_state_id = Some(thread_state_id.into());
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_plan(mut self, plan: Value) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Normalize an open input map into a task
    pub fn from_value(value: &Value) -> Self {
        let field = |names: &[&str]| names.iter().find_map(|name| value.get(*name));
        let string = |names: &[&str]| field(names).and_then(string_of);

        Self {
            task_id: string(&["task_id", "id"]),
            intent: string(&["intent"]),
            confidence: field(&["confidence"]).map(parse_confidence).unwrap_or(0.0),
            artifacts: field(&["artifacts"]).map(normalize_list).unwrap_or_default(),
            thread_state_id: string(&["threadStateId", "thread_state_id"]),
            metadata: field(&["metadata"])
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            request_id: string(&["requestId", "request_id"]),
            topic: string(&["topic"]),
            plan: field(&["plan"]).filter(|plan| !plan.is_null()).cloned(),
        }
    }

    /// Correlation key: request id, else thread-state id
    pub fn correlation_id(&self) -> Option<&str> {
        self.request_id
            .as_deref()
            .or(self.thread_state_id.as_deref())
    }
}

impl From<Value> for Task {
    fn from(value: Value) -> Self {
        Task::from_value(&value)
    }
}

fn string_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Float parse with `0` for missing, invalid or non-finite input
pub fn parse_confidence(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_float_prefix(s),
        _ => None,
    };
    parsed.filter(|c| c.is_finite()).unwrap_or(0.0)
}

/// Parse the longest leading decimal number of `s`, ignoring leading
/// whitespace and any trailing text. Non-finite results are `None`.
pub fn parse_float_prefix(s: &str) -> Option<f64> {
    let found = FLOAT_PREFIX_RE.find(s.trim_start())?;
    found
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn normalize_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(string_of).collect(),
        other => string_of(other).into_iter().collect(),
    }
}
