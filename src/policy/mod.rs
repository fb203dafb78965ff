//! Policy Gate
//!
//! ## Context (context.rs)
//!
//! The read-only [`PolicyContext`] policies evaluate against, with its
//! frozen plan snapshot.
//!
//! ## Gate (gate.rs)
//!
//! The [`Policy`] trait and the ordered, short-circuiting [`PolicyGate`].
//!
//! ## Built-ins (builtin.rs)
//!
//! Sensitive paths, regression references, lint evidence and test proof.

pub mod builtin;
pub mod context;
pub mod gate;

pub use builtin::{
    default_protected_paths, BlockSensitivePaths, RequireLintEvidence, RequireRegressionReference,
    RequireTestProof, DEFAULT_PROTECTED_PATHS,
};
pub use context::{DiffSummary, Evidence, FrozenPlan, PolicyContext, PolicyContextBuilder};
pub use gate::{policy_fn, FnPolicy, Policy, PolicyApproval, PolicyError, PolicyViolation, PolicyGate};
