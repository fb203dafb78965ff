//! Declarative Routing
//!
//! Decides which agent a task goes to and under which budget.
//!
//! ## Document (document.rs)
//!
//! Route rules, fallback rules, the budget table and defaults, loaded from
//! YAML or TOML.
//!
//! ## Matching (comparator.rs, glob.rs)
//!
//! Confidence comparators and artifact globs, compiled at load time and
//! evaluated as pure predicates.
//!
//! ## Engine (engine.rs)
//!
//! First-match-wins evaluation with fallback chaining and a cached,
//! modification-time checked document.

pub mod comparator;
pub mod decision;
pub mod document;
pub mod engine;
pub mod glob;

pub use comparator::{Comparator, FallbackCondition};
pub use decision::{
    FallbackTelemetry, ResolvedBudget, RouteTarget, RouteTelemetry, RoutingDecision,
    SignalsSummary,
};
pub use document::{
    ArtifactConstraint, FallbackRule, MatchCriteria, RouteRule, RouterDefaults, RouterDocument,
    RouterError,
};
pub use engine::{resolve_budget, route_with, RouterEngine, Signals, DEFAULT_FALLBACK_AGENT};
pub use glob::GlobPattern;
