//! Policy Gate
//!
//! Runs an ordered list of independent policies against a
//! [`PolicyContext`]. The first violation stops evaluation and is returned
//! as-is; there is no aggregate report. A gate approves only when every
//! policy passes.

use super::builtin;
use super::context::PolicyContext;
use crate::routing::GlobPattern;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Expected "deny" outcome of a policy, carrying the policy's name
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct PolicyViolation {
    pub message: String,
    pub policy: String,
}

impl PolicyViolation {
    pub fn new(policy: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            policy: policy.into(),
        }
    }
}

/// Policy evaluation errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A policy denied the context
    #[error("Policy violation ({}): {}", .0.policy, .0.message)]
    Violation(#[from] PolicyViolation),

    /// A policy could not be evaluated at all
    #[error("Policy '{policy}' failed: {source}")]
    Failed {
        policy: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PolicyError {
    pub fn as_violation(&self) -> Option<&PolicyViolation> {
        match self {
            PolicyError::Violation(violation) => Some(violation),
            PolicyError::Failed { .. } => None,
        }
    }
}

/// A single pluggable check. Implementations must not depend on anything
/// but the context they are given.
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn evaluate(&self, context: &PolicyContext) -> Result<(), PolicyError>;
}

/// Policy backed by a closure
pub struct FnPolicy<F> {
    name: String,
    check: F,
}

impl<F> Policy for FnPolicy<F>
where
    F: Fn(&PolicyContext) -> Result<(), PolicyError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, context: &PolicyContext) -> Result<(), PolicyError> {
        (self.check)(context)
    }
}

/// Wrap a closure as a named policy
pub fn policy_fn<F>(name: impl Into<String>, check: F) -> FnPolicy<F>
where
    F: Fn(&PolicyContext) -> Result<(), PolicyError> + Send + Sync,
{
    FnPolicy {
        name: name.into(),
        check,
    }
}

/// Successful gate outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyApproval {
    pub policy_count: usize,
}

/// Ordered, short-circuiting set of policies
#[derive(Clone, Default)]
pub struct PolicyGate {
    policies: Vec<Arc<dyn Policy>>,
}

impl PolicyGate {
    /// Gate with no policies; approves everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate with the four built-in policies and the default protected globs
    pub fn with_default_policies() -> Self {
        Self::with_protected_paths(builtin::default_protected_paths())
    }

    /// Built-in policies with a custom protected-path glob set
    pub fn with_protected_paths(protected: Vec<GlobPattern>) -> Self {
        let mut gate = Self::new();
        for policy in builtin::default_policies(protected) {
            gate.policies.push(policy);
        }
        gate
    }

    /// Append a policy; it runs after every policy already registered
    pub fn register<P: Policy + 'static>(&mut self, policy: P) -> &mut Self {
        self.policies.push(Arc::new(policy));
        self
    }

    pub fn with_policy<P: Policy + 'static>(mut self, policy: P) -> Self {
        self.register(policy);
        self
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(|policy| policy.name()).collect()
    }

    /// Approve the context or return the first failure
    pub fn evaluate(&self, context: &PolicyContext) -> Result<PolicyApproval, PolicyError> {
        let _span = crate::policy_span!(task_id = %context.task_id()).entered();

        for policy in &self.policies {
            if let Err(error) = policy.evaluate(context) {
                match &error {
                    PolicyError::Violation(violation) => info!(
                        policy = %violation.policy,
                        reason = %violation.message,
                        "Policy denied task"
                    ),
                    PolicyError::Failed { policy, .. } => {
                        debug!(policy = %policy, "Policy evaluation failed")
                    }
                }
                return Err(error);
            }
            debug!(policy = policy.name(), "Policy passed");
        }

        Ok(PolicyApproval {
            policy_count: self.policies.len(),
        })
    }
}

impl std::fmt::Debug for PolicyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyGate")
            .field("policies", &self.policy_names())
            .finish()
    }
}
