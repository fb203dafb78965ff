//! Taskgate
//!
//! Declarative task routing, policy gating and handoff tracing for
//! multi-agent orchestrators.
//!
//! # Overview
//!
//! - [`routing`]: first-match-wins routing rules with fallback chaining and
//!   named budgets, loaded from a hot-reloaded YAML or TOML document
//! - [`policy`]: an ordered gate of pluggable policies evaluated against a
//!   read-only context with a frozen plan snapshot
//! - [`handoff`]: validated role-to-role handoffs with per-gate policies and
//!   an append-only trace
//! - [`runner`]: the end-to-end pipeline (sanitize, rate limit, route, gate,
//!   execute)
//!
//! # Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use taskgate::routing::{RouterDocument, RouterEngine};
//! use taskgate::task::Task;
//!
//! let document = RouterDocument::from_yaml_str(
//!     r#"
//! routes:
//!   - name: rag
//!     match: { intent: search, confidence: ">=0.7" }
//!     target_agent: rag.agent
//!     budget: small
//! budgets:
//!   small: { max_tokens: 2000 }
//! "#,
//! )
//! .unwrap();
//!
//! let engine = RouterEngine::from_document(document);
//! let task = Task::new("search").with_confidence(0.9);
//! let decision = engine.route(&task).unwrap();
//!
//! assert_eq!(decision.target_agent(), Some("rag.agent"));
//! assert_eq!(
//!     decision.budget().unwrap().constraints.as_ref().unwrap()["max_tokens"],
//!     json!(2000)
//! );
//! ```

pub mod config;
pub mod error;
pub mod handoff;
pub mod observability;
pub mod policy;
pub mod routing;
pub mod runner;
pub mod task;
pub mod testing;

pub use config::GateConfig;
pub use error::{GateError, GateResult};
pub use handoff::HandoffManager;
pub use policy::{PolicyContext, PolicyGate, PolicyViolation};
pub use routing::{RouterEngine, RoutingDecision};
pub use runner::{RunOptions, RunOutcome, TaskRunner};
pub use task::Task;
