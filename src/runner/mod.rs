//! Task Runner
//!
//! Composes the router, the policy gate and an optional workflow executor
//! behind a per-caller rate limit.
//!
//! ## Input hygiene (sanitize.rs)
//!
//! Markup-significant characters are stripped from every string of the
//! raw task before anything reads it.
//!
//! ## Policy context (context_builder.rs)
//!
//! Frozen plan snapshot plus allow-listed metadata merged under a
//! configurable precedence.
//!
//! ## Pipeline (task_runner.rs)
//!
//! Rate limit, route, gate, execute.

pub mod context_builder;
pub mod rate_limit;
pub mod sanitize;
pub mod task_runner;
pub mod workflow;

pub use context_builder::{
    build_envelope, deep_merge_safe, sanitize_meta, ContextSettings, MetaPrecedence,
    MetadataEnvelope, DEFAULT_META_KEYS,
};
pub use rate_limit::SlidingWindowLimiter;
pub use sanitize::{sanitize_str, sanitize_value};
pub use task_runner::{
    ExecutionOutcome, PolicyOutcome, RunOptions, RunOutcome, RunnerError, TaskRunner,
    DEFAULT_RATE_LIMIT_MAX_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW_MS,
};
pub use workflow::{attach_budget, CreatedWorkflow, WorkflowExecutor};
