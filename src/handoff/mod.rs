//! Handoff Manager
//!
//! Validated, policy-checked transfers of work between roles, with an
//! append-only trace and a pull-based expiry sweep for in-flight handoffs.

pub mod dispatch;
pub mod manager;
pub mod policies;
pub mod types;

pub use dispatch::{AgentDispatcher, PassThroughDispatcher};
pub use manager::{HandoffManager, HandoffStats};
pub use policies::{default_gate_policies, GatePolicyFn};
pub use types::{
    ActiveHandoff, BoxError, DispatchResult, GateDecision, HandoffArgs, HandoffEnvelope,
    HandoffError, HandoffStatus, Role, TraceEntry, DEFAULT_TTL_MS,
};
