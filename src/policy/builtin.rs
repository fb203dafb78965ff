//! Default policy set
//!
//! Four independent checks, evaluated in this order by
//! [`PolicyGate::with_default_policies`](super::PolicyGate::with_default_policies).

use super::context::PolicyContext;
use super::gate::{Policy, PolicyError, PolicyViolation};
use crate::routing::GlobPattern;
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_PROTECTED_PATHS: [&str; 3] = [".github/**", "core/scripts/**", "policies/**"];

pub fn default_protected_paths() -> Vec<GlobPattern> {
    DEFAULT_PROTECTED_PATHS
        .iter()
        .map(|pattern| GlobPattern::new(pattern))
        .collect()
}

pub(crate) fn default_policies(protected: Vec<GlobPattern>) -> Vec<Arc<dyn Policy>> {
    vec![
        Arc::new(BlockSensitivePaths::new(protected)),
        Arc::new(RequireRegressionReference),
        Arc::new(RequireLintEvidence),
        Arc::new(RequireTestProof),
    ]
}

/// Rejects changes to protected paths unless manually approved
#[derive(Debug, Clone)]
pub struct BlockSensitivePaths {
    protected: Vec<GlobPattern>,
}

impl BlockSensitivePaths {
    pub const NAME: &'static str = "block_sensitive_files";

    pub fn new(protected: Vec<GlobPattern>) -> Self {
        Self { protected }
    }

    pub fn protected_paths(&self) -> &[GlobPattern] {
        &self.protected
    }
}

impl Default for BlockSensitivePaths {
    fn default() -> Self {
        Self::new(default_protected_paths())
    }
}

impl Policy for BlockSensitivePaths {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Prevent modifications to CI and security-critical files without override."
    }

    fn evaluate(&self, context: &PolicyContext) -> Result<(), PolicyError> {
        if context.manual_approval() {
            return Ok(());
        }

        let hits: Vec<&str> = context
            .files_changed()
            .iter()
            .filter(|path| self.protected.iter().any(|glob| glob.is_match(path)))
            .map(String::as_str)
            .collect();

        if hits.is_empty() {
            return Ok(());
        }

        Err(PolicyViolation::new(
            Self::NAME,
            format!(
                "Protected files touched: {}. Request manual approval.",
                hits.join(", ")
            ),
        )
        .into())
    }
}

/// Bug fixes must reference a failing test or reproduction
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireRegressionReference;

impl RequireRegressionReference {
    pub const NAME: &'static str = "require_regression_reference";
}

impl Policy for RequireRegressionReference {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Bug fixes must reference failing test or reproduction notes."
    }

    fn evaluate(&self, context: &PolicyContext) -> Result<(), PolicyError> {
        let reference = context.metadata().get("regression_reference");
        if context.intent() == Some("bugfix") && !is_truthy(reference) {
            return Err(PolicyViolation::new(
                Self::NAME,
                "Missing regression reference for bug fix task.",
            )
            .into());
        }
        Ok(())
    }
}

/// Lint fixes must carry tool output
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireLintEvidence;

impl RequireLintEvidence {
    pub const NAME: &'static str = "require_lint_evidence";
}

impl Policy for RequireLintEvidence {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Lint fixes must include before/after or tool output excerpt."
    }

    fn evaluate(&self, context: &PolicyContext) -> Result<(), PolicyError> {
        if context.intent() == Some("lint") && context.lint_output().is_empty() {
            return Err(
                PolicyViolation::new(Self::NAME, "Lint fix missing tool output evidence.").into(),
            );
        }
        Ok(())
    }
}

/// Logic-changing work must include test results
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireTestProof;

impl RequireTestProof {
    pub const NAME: &'static str = "require_test_proof";
}

impl Policy for RequireTestProof {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Code changes altering logic must include test results."
    }

    fn evaluate(&self, context: &PolicyContext) -> Result<(), PolicyError> {
        let needs_proof = matches!(context.intent(), Some("refactor") | Some("bugfix"));
        if needs_proof && context.test_evidence().is_empty() {
            return Err(PolicyViolation::new(
                Self::NAME,
                "Test evidence required for refactor/bugfix tasks.",
            )
            .into());
        }
        Ok(())
    }
}

// Empty strings, zero, false and null do not count as a reference.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Some(_) => true,
    }
}
