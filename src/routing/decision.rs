//! Routing decision types
//!
//! A decision is either `route` (a rule matched) or `fallback` (no rule
//! matched). There is no undecided state.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Outcome of routing a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RoutingDecision {
    Route {
        route: RouteTarget,
        budget: ResolvedBudget,
        telemetry: RouteTelemetry,
    },
    Fallback {
        action: String,
        target_agent: String,
        note: Option<String>,
        telemetry: FallbackTelemetry,
    },
}

/// Action half of a matched rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTarget {
    pub name: Option<String>,
    pub target_agent: Option<String>,
    pub handoff_template: Option<Value>,
    pub emit_context: Value,
    pub policy_gates: Vec<String>,
    pub metrics: Map<String, Value>,
}

/// Budget resolved by name from the document's budget table.
///
/// `constraints` is `None` both when no budget was named and when the named
/// budget does not exist; `name` tells the two apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBudget {
    pub name: Option<String>,
    pub constraints: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTelemetry {
    pub router_rule_id: Option<String>,
    pub thread_state_id: Option<String>,
    pub signals_summary: SignalsSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalsSummary {
    pub intent: Option<String>,
    pub confidence: f64,
    pub artifacts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackTelemetry {
    pub reason: String,
    pub thread_state_id: Option<String>,
}

impl RouteTarget {
    pub(crate) fn default_emit_context() -> Value {
        json!({ "include_payload": false })
    }
}

impl ResolvedBudget {
    /// True when a budget was named but not found in the table
    pub fn is_missing(&self) -> bool {
        self.name.is_some() && self.constraints.is_none()
    }
}

impl RoutingDecision {
    pub fn is_route(&self) -> bool {
        matches!(self, RoutingDecision::Route { .. })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, RoutingDecision::Fallback { .. })
    }

    /// Agent the task is sent to, whichever way it was decided
    pub fn target_agent(&self) -> Option<&str> {
        match self {
            RoutingDecision::Route { route, .. } => route.target_agent.as_deref(),
            RoutingDecision::Fallback { target_agent, .. } => Some(target_agent),
        }
    }

    /// Resolved budget; fallback decisions carry none
    pub fn budget(&self) -> Option<&ResolvedBudget> {
        match self {
            RoutingDecision::Route { budget, .. } => Some(budget),
            RoutingDecision::Fallback { .. } => None,
        }
    }

    pub fn thread_state_id(&self) -> Option<&str> {
        match self {
            RoutingDecision::Route { telemetry, .. } => telemetry.thread_state_id.as_deref(),
            RoutingDecision::Fallback { telemetry, .. } => telemetry.thread_state_id.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback() -> RoutingDecision {
        RoutingDecision::Fallback {
            action: "route_to".to_string(),
            target_agent: "orchestrator.fallback".to_string(),
            note: None,
            telemetry: FallbackTelemetry {
                reason: "no_route".to_string(),
                thread_state_id: Some("t-1".to_string()),
            },
        }
    }

    #[test]
    fn test_fallback_accessors() {
        let decision = fallback();
        assert!(decision.is_fallback());
        assert!(!decision.is_route());
        assert_eq!(decision.target_agent(), Some("orchestrator.fallback"));
        assert!(decision.budget().is_none());
        assert_eq!(decision.thread_state_id(), Some("t-1"));
    }

    #[test]
    fn test_decision_serializes_with_tag() {
        let value = serde_json::to_value(fallback()).unwrap();
        assert_eq!(value["decision"], "fallback");
        assert_eq!(value["telemetry"]["reason"], "no_route");
    }

    #[test]
    fn test_missing_budget_signal() {
        let missing = ResolvedBudget {
            name: Some("huge".to_string()),
            constraints: None,
        };
        assert!(missing.is_missing());
        assert!(!ResolvedBudget::default().is_missing());
    }
}
