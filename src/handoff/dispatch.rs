//! Agent dispatch boundary

use super::types::{BoxError, DispatchResult, HandoffArgs, HandoffEnvelope};
use chrono::Utc;
use std::collections::BTreeMap;

/// Delivers a validated, policy-approved handoff to its target.
///
/// Implementations enforce their own timeouts; the manager calls this
/// exactly once per successful handoff.
pub trait AgentDispatcher: Send + Sync {
    fn dispatch(
        &self,
        envelope: &HandoffEnvelope,
        args: &HandoffArgs,
    ) -> Result<DispatchResult, BoxError>;
}

/// Reports every want as fulfilled without contacting anything
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughDispatcher;

impl AgentDispatcher for PassThroughDispatcher {
    fn dispatch(
        &self,
        _envelope: &HandoffEnvelope,
        args: &HandoffArgs,
    ) -> Result<DispatchResult, BoxError> {
        let now = Utc::now();
        let millis = now.timestamp_millis();

        let outputs = (!args.wants.is_empty()).then(|| {
            args.wants
                .iter()
                .map(|want| (want.clone(), format!("generated_{want}_{millis}")))
                .collect::<BTreeMap<_, _>>()
        });

        Ok(DispatchResult {
            success: true,
            agent: args.to,
            gate: args.gate.clone(),
            wants_fulfilled: args.wants.clone(),
            outputs,
            timestamp: now.to_rfc3339(),
        })
    }
}
