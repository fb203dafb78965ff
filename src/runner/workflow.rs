//! Workflow executor boundary
//!
//! The runner only creates, budgets and triggers workflows; sequencing
//! their steps belongs to the executor.

use crate::handoff::BoxError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Handle returned by [`WorkflowExecutor::create_workflow`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedWorkflow {
    pub workflow_id: String,
}

#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    async fn create_workflow(&self, config: Value) -> Result<CreatedWorkflow, BoxError>;

    async fn execute_workflow(&self, workflow_id: &str) -> Result<Value, BoxError>;

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Value>, BoxError>;

    /// Replace the stored definition of an existing workflow
    async fn save_workflow(&self, workflow_id: &str, workflow: Value) -> Result<(), BoxError>;
}

/// Write `constraints` to `workflow.context.budget`, creating `context` if
/// needed. Non-object workflows are left untouched.
pub fn attach_budget(workflow: &mut Value, constraints: &Map<String, Value>) {
    let Some(root) = workflow.as_object_mut() else {
        return;
    };
    let context = root
        .entry("context")
        .or_insert_with(|| Value::Object(Map::new()));
    if !context.is_object() {
        *context = Value::Object(Map::new());
    }
    if let Value::Object(context) = context {
        context.insert("budget".to_string(), Value::Object(constraints.clone()));
    }
}
