//! Handoff data model: roles, arguments, trace entries and envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default active-handoff lifetime in milliseconds
pub const DEFAULT_TTL_MS: u64 = 30_000;

/// Boxed error for collaborator boundaries (gate policies, dispatchers)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Handoff errors
#[derive(Debug, Error)]
pub enum HandoffError {
    /// Arguments rejected before anything was recorded
    #[error("Handoff validation failed: {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Gate policy returned `allowed: false`
    #[error("Handoff blocked by policy: {reason}")]
    Blocked { gate: String, reason: String },

    /// Gate policy itself failed; the source is passed through unchanged
    #[error("Gate policy '{gate}' failed: {source}")]
    Policy {
        gate: String,
        #[source]
        source: BoxError,
    },

    #[error("Dispatch to {agent} failed: {source}")]
    Dispatch {
        agent: Role,
        #[source]
        source: BoxError,
    },
}

impl HandoffError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Fixed set of roles a handoff may target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Engineer,
    Teacher,
    Tester,
    Doc,
    Rules,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Engineer,
        Role::Teacher,
        Role::Tester,
        Role::Doc,
        Role::Rules,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Engineer => "engineer",
            Role::Teacher => "teacher",
            Role::Tester => "tester",
            Role::Doc => "doc",
            Role::Rules => "rules",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| HandoffError::validation("to", format!("Invalid role '{s}'")))
    }
}

/// Arguments of one handoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffArgs {
    pub to: Role,
    pub gate: String,
    pub reason: String,
    #[serde(default)]
    pub wants: Vec<String>,
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
}

fn default_ttl_ms() -> u64 {
    DEFAULT_TTL_MS
}

impl HandoffArgs {
    pub fn new(to: Role, gate: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            to,
            gate: gate.into(),
            reason: reason.into(),
            wants: Vec::new(),
            ttl_ms: DEFAULT_TTL_MS,
        }
    }

    pub fn with_wants<I, S>(mut self, wants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wants = wants.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Check the invariants the type system does not cover
    pub fn validate(&self) -> Result<(), HandoffError> {
        if self.gate.trim().is_empty() {
            return Err(HandoffError::validation("gate", "Invalid gate"));
        }
        if self.reason.trim().is_empty() {
            return Err(HandoffError::validation("reason", "Invalid reason"));
        }
        if self.ttl_ms == 0 {
            return Err(HandoffError::validation(
                "ttl_ms",
                "TTL must be positive number",
            ));
        }
        Ok(())
    }

    /// Parse and validate arguments from an open JSON map
    pub fn from_value(value: &Value) -> Result<Self, HandoffError> {
        Self::from_value_with_ttl(value, DEFAULT_TTL_MS)
    }

    /// [`from_value`](Self::from_value) with a custom `ttl_ms` default
    pub fn from_value_with_ttl(value: &Value, default_ttl_ms: u64) -> Result<Self, HandoffError> {
        let to = match value.get("to") {
            Some(Value::String(role)) => role.parse::<Role>()?,
            _ => return Err(HandoffError::validation("to", "Invalid role")),
        };

        let text = |field: &'static str, message: &'static str| match value.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
            _ => Err(HandoffError::validation(field, message)),
        };
        let gate = text("gate", "Invalid gate")?;
        let reason = text("reason", "Invalid reason")?;

        let wants = match value.get("wants") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(HandoffError::validation("wants", "Wants must be strings")),
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(HandoffError::validation("wants", "Wants must be array")),
        };

        let ttl_ms = match value.get("ttl_ms") {
            None | Some(Value::Null) => default_ttl_ms,
            Some(Value::Number(n)) => match n.as_f64() {
                Some(ttl) if ttl.is_finite() && ttl > 0.0 => ttl.ceil() as u64,
                _ => {
                    return Err(HandoffError::validation(
                        "ttl_ms",
                        "TTL must be positive number",
                    ))
                }
            },
            Some(_) => {
                return Err(HandoffError::validation(
                    "ttl_ms",
                    "TTL must be positive number",
                ))
            }
        };

        let args = Self {
            to,
            gate,
            reason,
            wants,
            ttl_ms,
        };
        args.validate()?;
        Ok(args)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,
    Blocked,
    Completed,
}

/// Outcome reported by an agent dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub success: bool,
    pub agent: Role,
    pub gate: String,
    pub wants_fulfilled: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, String>>,
    pub timestamp: String,
}

/// One append-only trace record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Unix milliseconds
    pub ts: i64,
    pub agent: String,
    pub to: Role,
    pub gate: String,
    pub reason: String,
    pub wants: Vec<String>,
    pub ttl_ms: u64,
    pub status: HandoffStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<DispatchResult>,
}

impl TraceEntry {
    pub(crate) const ISSUER: &'static str = "orchestrator";

    pub(crate) fn pending(args: &HandoffArgs, now: DateTime<Utc>) -> Self {
        Self {
            ts: now.timestamp_millis(),
            agent: Self::ISSUER.to_string(),
            to: args.to,
            gate: args.gate.clone(),
            reason: args.reason.clone(),
            wants: args.wants.clone(),
            ttl_ms: args.ttl_ms,
            status: HandoffStatus::Pending,
            policy_reason: None,
            result: None,
        }
    }
}

/// Work item passed between roles, carrying its own trace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandoffEnvelope {
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_state_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
}

impl HandoffEnvelope {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Default::default()
        }
    }

    pub fn with_thread_state_id(mut self, thread_state_id: impl Into<String>) -> Self {
        self.thread_state_id = Some(thread_state_id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Key for the active-handoff table: request id, thread id, or `unknown`
    pub fn correlation_key(&self) -> &str {
        self.request_id
            .as_deref()
            .or(self.thread_state_id.as_deref())
            .unwrap_or("unknown")
    }
}

/// In-flight handoff, kept until an expiry sweep removes it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveHandoff {
    pub request_id: String,
    pub to: Role,
    pub gate: String,
    pub reason: String,
    pub wants: Vec<String>,
    pub ttl_ms: u64,
    pub start_time: DateTime<Utc>,
}

impl ActiveHandoff {
    /// Expired once strictly more than `ttl_ms` has elapsed
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(self.start_time).num_milliseconds();
        elapsed > i64::try_from(self.ttl_ms).unwrap_or(i64::MAX)
    }
}

/// Verdict of a per-gate policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
}

impl GateDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}
