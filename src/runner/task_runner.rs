//! Task Runner
//!
//! One call to [`TaskRunner::run`] walks the whole pipeline in a fixed
//! order:
//!
//! 1. sanitize the raw input
//! 2. enforce the caller's rate limit
//! 3. route the task
//! 4. build a policy context and evaluate the gate (route decisions only,
//!    unless skipped)
//! 5. hand the routed, approved task to the workflow executor, if any
//!
//! A policy violation is a normal outcome and comes back inside
//! [`RunOutcome`]; every other failure is a [`RunnerError`].

use super::context_builder::{build_envelope, ContextSettings};
use super::rate_limit::SlidingWindowLimiter;
use super::sanitize::sanitize_value;
use super::workflow::{attach_budget, WorkflowExecutor};
use crate::config::GateConfig;
use crate::handoff::BoxError;
use crate::observability::{MetricsSnapshot, RunnerMetrics};
use crate::policy::{DiffSummary, Evidence, PolicyApproval, PolicyContext, PolicyError, PolicyGate};
use crate::routing::{ResolvedBudget, RouterEngine, RouterError, RoutingDecision};
use crate::task::Task;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};

pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: usize = 60;

const NO_WORKFLOW_NOTE: &str = "No workflow provided for execution.";

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Rate limit exceeded for '{key}': at most {limit} requests per {window_ms}ms")]
    RateLimited {
        key: String,
        limit: usize,
        window_ms: u64,
    },

    #[error("Routing failed: {0}")]
    Router(#[from] RouterError),

    /// A policy failed to evaluate; violations never surface here
    #[error(transparent)]
    Policy(PolicyError),

    #[error("Workflow executor failed: {0}")]
    Executor(#[source] BoxError),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl RunnerError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Per-call options for [`TaskRunner::run`]
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub skip_policy: bool,
    pub diff: Option<DiffSummary>,
    pub evidence: Option<Evidence>,
    /// Plan to evaluate against; the task's embedded `plan` is used otherwise
    pub plan: Option<Value>,
    pub workflow_id: Option<String>,
    pub workflow: Option<Value>,
    /// Rate-limit key; defaults to the task's thread-state id, then `global`
    pub caller_key: Option<String>,
    /// Lets changes to protected paths through the sensitive-path policy
    pub manual_approval: bool,
    pub now: Option<DateTime<Utc>>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_policy(mut self) -> Self {
        self.skip_policy = true;
        self
    }

    pub fn with_diff(mut self, diff: DiffSummary) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn with_plan(mut self, plan: Value) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_workflow(mut self, workflow: Value) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn with_caller_key(mut self, key: impl Into<String>) -> Self {
        self.caller_key = Some(key.into());
        self
    }

    pub fn with_manual_approval(mut self) -> Self {
        self.manual_approval = true;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PolicyOutcome {
    Approved {
        #[serde(rename = "policyCount")]
        policy_count: usize,
    },
    Rejected {
        reason: String,
        policy: String,
    },
}

impl PolicyOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, PolicyOutcome::Approved { .. })
    }
}

impl From<PolicyApproval> for PolicyOutcome {
    fn from(approval: PolicyApproval) -> Self {
        PolicyOutcome::Approved {
            policy_count: approval.policy_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Policy rejected the task
    Skipped,
    /// Approved, but no workflow was supplied
    Pending { note: String },
    Executed { workflow_id: String, result: Value },
}

/// Result of one [`TaskRunner::run`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub routing: RoutingDecision,
    pub policy: Option<PolicyOutcome>,
    pub budget: Option<ResolvedBudget>,
    pub execution: Option<ExecutionOutcome>,
}

pub struct TaskRunner {
    router: Arc<RouterEngine>,
    gate: PolicyGate,
    executor: Option<Arc<dyn WorkflowExecutor>>,
    limiter: SlidingWindowLimiter,
    context: ContextSettings,
    metrics: RunnerMetrics,
}

impl TaskRunner {
    /// Runner with the default policies, the default rate limit and
    /// context settings read from the environment
    pub fn new(router: RouterEngine) -> Self {
        Self {
            router: Arc::new(router),
            gate: PolicyGate::with_default_policies(),
            executor: None,
            limiter: SlidingWindowLimiter::new(
                Duration::from_millis(DEFAULT_RATE_LIMIT_WINDOW_MS),
                DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            ),
            context: ContextSettings::from_env(),
            metrics: RunnerMetrics::new(),
        }
    }

    /// Runner wired from runtime settings
    pub fn from_config(config: &GateConfig) -> Self {
        let router = RouterEngine::from_path(&config.router.config_path)
            .with_default_fallback_agent(config.router.default_fallback_agent.clone());
        Self::new(router)
            .with_policy_gate(PolicyGate::with_protected_paths(config.protected_paths()))
            .with_rate_limit(
                Duration::from_millis(config.rate_limit.window_ms),
                config.rate_limit.max_requests,
            )
            .with_context_settings(config.context_settings())
    }

    pub fn with_policy_gate(mut self, gate: PolicyGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn WorkflowExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_rate_limit(mut self, window: Duration, max_requests: usize) -> Self {
        self.limiter = SlidingWindowLimiter::new(window, max_requests);
        self
    }

    pub fn with_context_settings(mut self, settings: ContextSettings) -> Self {
        self.context = settings;
        self
    }

    pub fn router(&self) -> &RouterEngine {
        &self.router
    }

    pub fn policy_gate(&self) -> &PolicyGate {
        &self.gate
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn route_task(&self, task: &Task) -> Result<RoutingDecision, RouterError> {
        self.router.route(task)
    }

    /// Policy context for `task` under this runner's context settings
    pub fn build_policy_context(&self, task: &Task, options: &RunOptions) -> PolicyContext {
        let plan = options.plan.as_ref().or(task.plan.as_ref());
        build_envelope(task, plan, options.now, &self.context).into_policy_context(
            options.diff.clone().unwrap_or_default(),
            options.evidence.clone().unwrap_or_default(),
            options.manual_approval,
        )
    }

    pub fn evaluate_policies(&self, context: &PolicyContext) -> Result<PolicyApproval, PolicyError> {
        self.gate.evaluate(context)
    }

    /// Run an already-built task
    pub async fn run_task(&self, task: &Task, options: RunOptions) -> Result<RunOutcome, RunnerError> {
        let input = serde_json::to_value(task).map_err(|e| RunnerError::invalid_input(e.to_string()))?;
        self.run(&input, options).await
    }

    /// Run a raw task map through the pipeline; `input` itself is never modified
    pub async fn run(&self, input: &Value, options: RunOptions) -> Result<RunOutcome, RunnerError> {
        if !input.is_object() {
            return Err(RunnerError::invalid_input("task must be a JSON object"));
        }
        self.metrics.task_received();

        let task = Task::from_value(&sanitize_value(input));

        let key = options
            .caller_key
            .clone()
            .or_else(|| task.thread_state_id.clone())
            .unwrap_or_else(|| "global".to_string());
        let span = crate::run_span!(key = %key, intent = ?task.intent);

        self.run_pipeline(task, key, options).instrument(span).await
    }

    async fn run_pipeline(
        &self,
        task: Task,
        key: String,
        options: RunOptions,
    ) -> Result<RunOutcome, RunnerError> {
        if !self.limiter.try_acquire(&key) {
            self.metrics.rate_limited();
            let window_ms = u64::try_from(self.limiter.window().as_millis()).unwrap_or(u64::MAX);
            warn!(
                key = %key,
                limit = self.limiter.max_requests(),
                window_ms,
                "Rate limit exceeded"
            );
            return Err(RunnerError::RateLimited {
                key,
                limit: self.limiter.max_requests(),
                window_ms,
            });
        }

        let routing = self.router.route(&task)?;
        if routing.is_route() {
            self.metrics.routed();
        } else {
            self.metrics.fallback();
        }

        let mut outcome = RunOutcome {
            budget: routing.budget().cloned(),
            routing,
            policy: None,
            execution: None,
        };

        if !outcome.routing.is_route() || options.skip_policy {
            debug!(
                fallback = outcome.routing.is_fallback(),
                skip_policy = options.skip_policy,
                "Execution not attempted"
            );
            return Ok(outcome);
        }

        let context = self.build_policy_context(&task, &options);
        match self.gate.evaluate(&context) {
            Ok(approval) => {
                self.metrics.approved();
                outcome.policy = Some(approval.into());
            }
            Err(PolicyError::Violation(violation)) => {
                self.metrics.rejected();
                outcome.policy = Some(PolicyOutcome::Rejected {
                    reason: violation.message,
                    policy: violation.policy,
                });
                outcome.execution = Some(ExecutionOutcome::Skipped);
                return Ok(outcome);
            }
            Err(error) => return Err(RunnerError::Policy(error)),
        }

        let Some(executor) = self.executor.as_ref() else {
            return Ok(outcome);
        };

        let constraints = outcome.budget.as_ref().and_then(|b| b.constraints.clone());

        let execution = match (&options.workflow_id, &options.workflow) {
            (Some(workflow_id), _) => {
                if let Some(constraints) = &constraints {
                    let stored = executor
                        .get_workflow(workflow_id)
                        .await
                        .map_err(RunnerError::Executor)?;
                    if let Some(mut workflow) = stored {
                        attach_budget(&mut workflow, constraints);
                        executor
                            .save_workflow(workflow_id, workflow)
                            .await
                            .map_err(RunnerError::Executor)?;
                    }
                }
                let result = executor
                    .execute_workflow(workflow_id)
                    .await
                    .map_err(RunnerError::Executor)?;
                ExecutionOutcome::Executed {
                    workflow_id: workflow_id.clone(),
                    result,
                }
            }
            (None, Some(workflow)) => {
                let mut config = workflow.clone();
                if let Some(constraints) = &constraints {
                    attach_budget(&mut config, constraints);
                }
                let created = executor
                    .create_workflow(config)
                    .await
                    .map_err(RunnerError::Executor)?;
                let result = executor
                    .execute_workflow(&created.workflow_id)
                    .await
                    .map_err(RunnerError::Executor)?;
                ExecutionOutcome::Executed {
                    workflow_id: created.workflow_id,
                    result,
                }
            }
            (None, None) => ExecutionOutcome::Pending {
                note: NO_WORKFLOW_NOTE.to_string(),
            },
        };

        if let ExecutionOutcome::Executed { workflow_id, .. } = &execution {
            self.metrics.executed();
            info!(workflow_id = %workflow_id, "Workflow executed");
        }
        outcome.execution = Some(execution);
        Ok(outcome)
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("gate", &self.gate)
            .field("has_executor", &self.executor.is_some())
            .field("limiter", &self.limiter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RouterDocument;
    use crate::testing::MockWorkflowExecutor;
    use serde_json::json;

    const DOC: &str = r#"
routes:
  - name: lint-fix
    match:
      intent: lint
    target_agent: engineer
    budget: small
  - name: bugfix
    match:
      intent: bugfix
    target_agent: engineer
budgets:
  small:
    max_tokens: 2000
"#;

    fn runner() -> TaskRunner {
        let document = RouterDocument::from_yaml_str(DOC).unwrap();
        TaskRunner::new(RouterEngine::from_document(document))
            .with_context_settings(ContextSettings::default())
    }

    fn lint_evidence() -> Evidence {
        Evidence {
            lint: vec!["clippy: 0 warnings".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_rejects_non_object_input() {
        let error = runner().run(&json!("lint"), RunOptions::new()).await.unwrap_err();
        assert!(matches!(error, RunnerError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_approved_without_executor_has_no_execution() {
        let task = json!({"intent": "lint", "metadata": {"intent": "lint"}});
        let outcome = runner()
            .run(&task, RunOptions::new().with_evidence(lint_evidence()))
            .await
            .unwrap();

        assert!(outcome.routing.is_route());
        assert_eq!(outcome.policy, Some(PolicyOutcome::Approved { policy_count: 4 }));
        assert_eq!(outcome.budget.unwrap().constraints.unwrap()["max_tokens"], 2000);
        assert!(outcome.execution.is_none());
    }

    #[tokio::test]
    async fn test_violation_is_captured() {
        let task = json!({"intent": "lint", "metadata": {"intent": "lint"}});
        let runner = runner();
        let outcome = runner.run(&task, RunOptions::new()).await.unwrap();

        assert_eq!(
            outcome.policy,
            Some(PolicyOutcome::Rejected {
                reason: "Lint fix missing tool output evidence.".to_string(),
                policy: "require_lint_evidence".to_string(),
            })
        );
        assert_eq!(outcome.execution, Some(ExecutionOutcome::Skipped));
        assert_eq!(runner.metrics().rejected, 1);
    }

    #[tokio::test]
    async fn test_pending_when_no_workflow_given() {
        let executor = Arc::new(MockWorkflowExecutor::new());
        let runner = runner().with_executor(executor.clone());
        let task = json!({"intent": "lint", "metadata": {"intent": "lint"}});

        let outcome = runner
            .run(&task, RunOptions::new().with_evidence(lint_evidence()))
            .await
            .unwrap();

        assert_eq!(
            outcome.execution,
            Some(ExecutionOutcome::Pending {
                note: "No workflow provided for execution.".to_string()
            })
        );
        assert_eq!(executor.get_executed().await.len(), 0);
    }

    #[tokio::test]
    async fn test_fallback_never_evaluates_or_executes() {
        let executor = Arc::new(MockWorkflowExecutor::new());
        let runner = runner().with_executor(executor.clone());

        let outcome = runner
            .run(
                &json!({"intent": "unknown"}),
                RunOptions::new().with_workflow(json!({"steps": []})),
            )
            .await
            .unwrap();

        assert!(outcome.routing.is_fallback());
        assert!(outcome.policy.is_none());
        assert!(outcome.budget.is_none());
        assert!(outcome.execution.is_none());
        assert!(executor.get_executed().await.is_empty());
        assert_eq!(runner.metrics().fallback, 1);
    }

    #[tokio::test]
    async fn test_skip_policy_never_executes() {
        let executor = Arc::new(MockWorkflowExecutor::new());
        let runner = runner().with_executor(executor.clone());

        let outcome = runner
            .run(
                &json!({"intent": "bugfix"}),
                RunOptions::new().skip_policy().with_workflow(json!({"steps": []})),
            )
            .await
            .unwrap();

        assert!(outcome.routing.is_route());
        assert!(outcome.policy.is_none());
        assert!(outcome.execution.is_none());
        assert!(executor.get_executed().await.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_before_routing() {
        let runner = runner().with_rate_limit(Duration::from_secs(60), 1);
        let task = json!({"intent": "unknown", "threadStateId": "t-1"});

        assert!(runner.run(&task, RunOptions::new()).await.is_ok());
        let error = runner.run(&task, RunOptions::new()).await.unwrap_err();

        match error {
            RunnerError::RateLimited { key, limit, window_ms } => {
                assert_eq!(key, "t-1");
                assert_eq!(limit, 1);
                assert_eq!(window_ms, 60_000);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(runner
            .run(&task, RunOptions::new().with_caller_key("other"))
            .await
            .is_ok());

        let metrics = runner.metrics();
        assert_eq!(metrics.rate_limited, 1);
        assert_eq!(metrics.fallback, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_future_can_be_spawned() {
        let executor = Arc::new(MockWorkflowExecutor::new());
        let runner = Arc::new(runner().with_executor(executor.clone()));
        let task = json!({"intent": "lint", "metadata": {"intent": "lint"}});

        let spawned = Arc::clone(&runner);
        let outcome = tokio::spawn(async move {
            spawned
                .run(
                    &task,
                    RunOptions::new()
                        .with_evidence(lint_evidence())
                        .with_workflow(json!({"steps": [{"id": "fix"}]})),
                )
                .await
        })
        .await
        .unwrap()
        .unwrap();

        assert!(matches!(outcome.execution, Some(ExecutionOutcome::Executed { .. })));
        assert_eq!(executor.get_executed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_input_is_not_mutated() {
        let task = json!({"intent": "<lint>", "metadata": {"intent": "lint"}});
        let before = task.clone();
        let outcome = runner().run(&task, RunOptions::new()).await.unwrap();

        assert_eq!(task, before);
        assert_eq!(outcome.routing.target_agent(), Some("engineer"));
    }
}
