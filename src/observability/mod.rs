//! Observability: structured logging and per-runner counters.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{MetricsSnapshot, RunnerMetrics};

// Span macros for structured logging
pub use logging::{handoff_span, policy_span, route_span, run_span};
