//! Built-in per-gate policies
//!
//! Registered by [`HandoffManager::with_default_policies`](super::HandoffManager::with_default_policies).
//! Each sees the envelope after the current handoff's pending entry has
//! been appended.

use super::types::{BoxError, GateDecision, HandoffArgs, HandoffEnvelope, HandoffStatus};
use serde_json::Value;
use std::sync::Arc;

/// Typed per-gate policy function
pub type GatePolicyFn =
    Arc<dyn Fn(&HandoffEnvelope, &HandoffArgs) -> Result<GateDecision, BoxError> + Send + Sync>;

/// `planner`: the payload must list at least one source
pub fn planner(envelope: &HandoffEnvelope, _args: &HandoffArgs) -> Result<GateDecision, BoxError> {
    let has_sources = match envelope.payload.get("sources") {
        Some(Value::Array(sources)) => !sources.is_empty(),
        Some(Value::String(source)) => !source.is_empty(),
        _ => false,
    };
    Ok(if has_sources {
        GateDecision::allow("Sources available")
    } else {
        GateDecision::deny("No sources provided")
    })
}

/// `critic`: the handoff before this one must have completed
pub fn critic(envelope: &HandoffEnvelope, _args: &HandoffArgs) -> Result<GateDecision, BoxError> {
    let previous = envelope.trace.iter().rev().nth(1);
    Ok(match previous {
        Some(entry) if entry.status == HandoffStatus::Completed => {
            GateDecision::allow("Previous step completed")
        }
        _ => GateDecision::deny("Previous step not completed"),
    })
}

/// `policy_gate`: the payload must carry `policy_ok: true`
pub fn policy_gate(
    envelope: &HandoffEnvelope,
    _args: &HandoffArgs,
) -> Result<GateDecision, BoxError> {
    Ok(
        if envelope.payload.get("policy_ok").and_then(Value::as_bool) == Some(true) {
            GateDecision::allow("Policy check passed")
        } else {
            GateDecision::deny("Policy check failed")
        },
    )
}

pub fn default_gate_policies() -> Vec<(&'static str, GatePolicyFn)> {
    vec![
        ("planner", Arc::new(planner) as GatePolicyFn),
        ("critic", Arc::new(critic) as GatePolicyFn),
        ("policy_gate", Arc::new(policy_gate) as GatePolicyFn),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::types::{Role, TraceEntry};
    use chrono::Utc;
    use serde_json::json;

    fn args() -> HandoffArgs {
        HandoffArgs::new(Role::Engineer, "planner", "plan")
    }

    #[test]
    fn test_planner_requires_sources() {
        let empty = HandoffEnvelope::new("r").with_payload(json!({"sources": []}));
        assert!(!planner(&empty, &args()).unwrap().allowed);

        let missing = HandoffEnvelope::new("r");
        assert_eq!(planner(&missing, &args()).unwrap().reason, "No sources provided");

        let ok = HandoffEnvelope::new("r").with_payload(json!({"sources": ["a.md"]}));
        assert!(planner(&ok, &args()).unwrap().allowed);
    }

    #[test]
    fn test_critic_looks_at_previous_entry() {
        let mut envelope = HandoffEnvelope::new("r");
        envelope.trace.push(TraceEntry::pending(&args(), Utc::now()));
        assert!(!critic(&envelope, &args()).unwrap().allowed);

        envelope.trace[0].status = HandoffStatus::Completed;
        envelope.trace.push(TraceEntry::pending(&args(), Utc::now()));
        assert!(critic(&envelope, &args()).unwrap().allowed);

        envelope.trace[1].status = HandoffStatus::Blocked;
        envelope.trace.push(TraceEntry::pending(&args(), Utc::now()));
        assert!(!critic(&envelope, &args()).unwrap().allowed);
    }

    #[test]
    fn test_policy_gate_requires_flag() {
        let denied = HandoffEnvelope::new("r").with_payload(json!({"policy_ok": "yes"}));
        assert!(!policy_gate(&denied, &args()).unwrap().allowed);

        let allowed = HandoffEnvelope::new("r").with_payload(json!({"policy_ok": true}));
        assert!(policy_gate(&allowed, &args()).unwrap().allowed);
    }
}
