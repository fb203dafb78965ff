//! Handoff Manager
//!
//! Owns the per-request trace history, the active-handoff table and the
//! per-gate policy registry. All three are instance state behind their own
//! lock, so independent managers never see each other's handoffs.

use super::dispatch::{AgentDispatcher, PassThroughDispatcher};
use super::policies::{default_gate_policies, GatePolicyFn};
use super::types::{
    ActiveHandoff, BoxError, DispatchResult, GateDecision, HandoffArgs, HandoffEnvelope,
    HandoffError, HandoffStatus, TraceEntry, DEFAULT_TTL_MS,
};
use crate::config::GateConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Counts reported by [`HandoffManager::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HandoffStats {
    pub active_handoffs: usize,
    pub registered_policies: usize,
    pub total_traces: usize,
}

pub struct HandoffManager {
    default_ttl_ms: u64,
    dispatcher: Arc<dyn AgentDispatcher>,
    policies: RwLock<HashMap<String, GatePolicyFn>>,
    traces: RwLock<HashMap<String, Vec<TraceEntry>>>,
    active: RwLock<HashMap<String, ActiveHandoff>>,
}

impl Default for HandoffManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HandoffManager {
    /// Manager with the pass-through dispatcher and no gate policies
    pub fn new() -> Self {
        Self::with_dispatcher(Arc::new(PassThroughDispatcher))
    }

    pub fn with_dispatcher(dispatcher: Arc<dyn AgentDispatcher>) -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            dispatcher,
            policies: RwLock::new(HashMap::new()),
            traces: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Manager with the default gate policies and the configured TTL default
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new()
            .with_default_policies()
            .with_default_ttl_ms(config.handoff.default_ttl_ms)
    }

    /// TTL applied by [`args_from_value`](Self::args_from_value) when the input has none
    pub fn with_default_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.default_ttl_ms = ttl_ms;
        self
    }

    /// Parse handoff arguments from an open map using this manager's TTL default
    pub fn args_from_value(&self, value: &Value) -> Result<HandoffArgs, HandoffError> {
        HandoffArgs::from_value_with_ttl(value, self.default_ttl_ms)
    }

    /// Register the `planner`, `critic` and `policy_gate` policies
    pub fn with_default_policies(self) -> Self {
        {
            let mut policies = self.policies.write().unwrap_or_else(PoisonError::into_inner);
            for (gate, policy) in default_gate_policies() {
                policies.insert(gate.to_string(), policy);
            }
        }
        self
    }

    /// Register (or replace) the policy for `gate`
    pub fn register_policy<F>(&self, gate: impl Into<String>, policy: F)
    where
        F: Fn(&HandoffEnvelope, &HandoffArgs) -> Result<GateDecision, BoxError>
            + Send
            + Sync
            + 'static,
    {
        let gate = gate.into();
        let mut policies = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        policies.insert(gate.clone(), Arc::new(policy));
        info!(gate = %gate, "Registered handoff gate policy");
    }

    /// Validate, record, check the gate policy and dispatch.
    ///
    /// Invalid arguments fail before anything is recorded. Otherwise a
    /// pending entry is appended to `envelope.trace` and transitions at most
    /// once, to `blocked` or `completed`.
    pub fn handoff(
        &self,
        envelope: &mut HandoffEnvelope,
        args: &HandoffArgs,
    ) -> Result<DispatchResult, HandoffError> {
        args.validate()?;

        let key = envelope.correlation_key().to_string();
        let _span = crate::handoff_span!(request_id = %key, gate = %args.gate, to = %args.to)
            .entered();
        let now = Utc::now();

        envelope.trace.push(TraceEntry::pending(args, now));
        let index = envelope.trace.len() - 1;

        {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            active.insert(
                key.clone(),
                ActiveHandoff {
                    request_id: key.clone(),
                    to: args.to,
                    gate: args.gate.clone(),
                    reason: args.reason.clone(),
                    wants: args.wants.clone(),
                    ttl_ms: args.ttl_ms,
                    start_time: now,
                },
            );
        }
        info!(reason = %args.reason, ttl_ms = args.ttl_ms, "Handoff recorded");

        let policy = {
            let policies = self.policies.read().unwrap_or_else(PoisonError::into_inner);
            policies.get(&args.gate).cloned()
        };

        if let Some(policy) = policy {
            let decision = match policy(&*envelope, args) {
                Ok(decision) => decision,
                Err(source) => {
                    self.record(&key, &envelope.trace[index]);
                    return Err(HandoffError::Policy {
                        gate: args.gate.clone(),
                        source,
                    });
                }
            };

            if !decision.allowed {
                let entry = &mut envelope.trace[index];
                entry.status = HandoffStatus::Blocked;
                entry.policy_reason = Some(decision.reason.clone());
                self.record(&key, entry);
                info!(policy_reason = %decision.reason, "Handoff blocked by gate policy");
                return Err(HandoffError::Blocked {
                    gate: args.gate.clone(),
                    reason: decision.reason,
                });
            }
            debug!(reason = %decision.reason, "Gate policy allowed handoff");
        }

        let result = match self.dispatcher.dispatch(&*envelope, args) {
            Ok(result) => result,
            Err(source) => {
                self.record(&key, &envelope.trace[index]);
                return Err(HandoffError::Dispatch {
                    agent: args.to,
                    source,
                });
            }
        };

        let entry = &mut envelope.trace[index];
        entry.status = HandoffStatus::Completed;
        entry.result = Some(result.clone());
        self.record(&key, entry);
        info!(success = result.success, "Handoff completed");

        Ok(result)
    }

    fn record(&self, key: &str, entry: &TraceEntry) {
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        traces.entry(key.to_string()).or_default().push(entry.clone());
    }

    /// Every entry recorded for `request_id`, in call order
    pub fn get_trace(&self, request_id: &str) -> Vec<TraceEntry> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces.get(request_id).cloned().unwrap_or_default()
    }

    pub fn get_active_handoff(&self, request_id: &str) -> Option<ActiveHandoff> {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        active.get(request_id).cloned()
    }

    /// Remove active handoffs whose TTL has elapsed; returns the count removed
    pub fn cleanup_expired_handoffs(&self) -> usize {
        self.cleanup_expired_handoffs_at(Utc::now())
    }

    /// [`cleanup_expired_handoffs`](Self::cleanup_expired_handoffs) against a given clock
    pub fn cleanup_expired_handoffs_at(&self, now: DateTime<Utc>) -> usize {
        let (initial_count, removed_count) = {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            let initial_count = active.len();
            let mut removed_count = 0;

            active.retain(|request_id, handoff| {
                if handoff.is_expired_at(now) {
                    debug!(request_id = %request_id, "Removing expired handoff");
                    removed_count += 1;
                    false
                } else {
                    true
                }
            });

            (initial_count, removed_count)
        };

        if removed_count > 0 {
            info!(
                "Cleaned up {} expired handoffs ({} -> {})",
                removed_count,
                initial_count,
                initial_count - removed_count
            );
        }

        removed_count
    }

    pub fn stats(&self) -> HandoffStats {
        HandoffStats {
            active_handoffs: self.active.read().unwrap_or_else(PoisonError::into_inner).len(),
            registered_policies: self
                .policies
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            total_traces: self.traces.read().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }
}

impl std::fmt::Debug for HandoffManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffManager")
            .field("stats", &self.stats())
            .finish()
    }
}
