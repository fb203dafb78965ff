//! Mock implementations for testing
//!
//! In-memory stand-ins for the workflow executor and the agent dispatcher
//! so the runner and handoff manager can be exercised without external
//! services.

use crate::handoff::{
    AgentDispatcher, BoxError, DispatchResult, HandoffArgs, HandoffEnvelope, PassThroughDispatcher,
};
use crate::runner::{CreatedWorkflow, WorkflowExecutor};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Mock workflow executor storing workflows in memory
#[derive(Debug, Default)]
pub struct MockWorkflowExecutor {
    pub workflows: Arc<Mutex<HashMap<String, Value>>>,
    pub created: Arc<Mutex<Vec<Value>>>,
    pub executed: Arc<Mutex<Vec<String>>>,
    pub should_fail: bool,
}

impl MockWorkflowExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Seed a stored workflow
    pub async fn insert_workflow(&self, workflow_id: impl Into<String>, workflow: Value) {
        self.workflows.lock().await.insert(workflow_id.into(), workflow);
    }

    pub async fn stored_workflow(&self, workflow_id: &str) -> Option<Value> {
        self.workflows.lock().await.get(workflow_id).cloned()
    }

    pub async fn get_created(&self) -> Vec<Value> {
        self.created.lock().await.clone()
    }

    pub async fn get_executed(&self) -> Vec<String> {
        self.executed.lock().await.clone()
    }
}

#[async_trait]
impl WorkflowExecutor for MockWorkflowExecutor {
    async fn create_workflow(&self, config: Value) -> Result<CreatedWorkflow, BoxError> {
        if self.should_fail {
            return Err("Mock executor failure".into());
        }
        let workflow_id = format!("wf-{}", Uuid::new_v4());
        self.created.lock().await.push(config.clone());
        self.workflows
            .lock()
            .await
            .insert(workflow_id.clone(), config);
        Ok(CreatedWorkflow { workflow_id })
    }

    async fn execute_workflow(&self, workflow_id: &str) -> Result<Value, BoxError> {
        if self.should_fail {
            return Err("Mock executor failure".into());
        }
        let workflow = self
            .workflows
            .lock()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| format!("Workflow not found: {workflow_id}"))?;
        self.executed.lock().await.push(workflow_id.to_string());

        let steps = workflow
            .get("steps")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        Ok(json!({
            "status": "completed",
            "steps_executed": steps,
            "budget": workflow.get("context").and_then(|c| c.get("budget")).cloned(),
        }))
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Value>, BoxError> {
        Ok(self.workflows.lock().await.get(workflow_id).cloned())
    }

    async fn save_workflow(&self, workflow_id: &str, workflow: Value) -> Result<(), BoxError> {
        if self.should_fail {
            return Err("Mock executor failure".into());
        }
        self.workflows
            .lock()
            .await
            .insert(workflow_id.to_string(), workflow);
        Ok(())
    }
}

/// Dispatcher that records every call and answers like the pass-through one
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    pub calls: std::sync::Mutex<Vec<(String, HandoffArgs)>>,
    pub should_fail: bool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn get_calls(&self) -> Vec<(String, HandoffArgs)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AgentDispatcher for RecordingDispatcher {
    fn dispatch(
        &self,
        envelope: &HandoffEnvelope,
        args: &HandoffArgs,
    ) -> Result<DispatchResult, BoxError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((envelope.correlation_key().to_string(), args.clone()));
        if self.should_fail {
            return Err(format!("Mock dispatch to {} failed", args.to).into());
        }
        PassThroughDispatcher.dispatch(envelope, args)
    }
}
