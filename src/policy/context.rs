//! Policy Context: the read-only view a policy evaluates against.
//!
//! Every field is private and exposed through shared references, so a
//! policy cannot change what the next policy sees. The plan snapshot is a
//! [`FrozenPlan`], which hands out `&Value` only; writing through it does
//! not compile:
//!
//! ```compile_fail
//! use taskgate::policy::FrozenPlan;
//! use serde_json::json;
//!
//! let mut plan = FrozenPlan::new(&json!({"steps": []}));
//! plan["steps"].as_array_mut().unwrap().push(json!({"id": "s2"}));
//! ```

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::ops::Deref;
use std::sync::Arc;

/// Immutable, shareable snapshot of a caller-supplied plan
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenPlan(Arc<Value>);

impl FrozenPlan {
    /// Deep-copy `plan`; later changes to the caller's value are not seen
    pub fn new(plan: &Value) -> Self {
        Self(Arc::new(plan.clone()))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Short SHA-256 digest (8 hex chars) of the canonical JSON form
    pub fn digest(&self) -> String {
        let serialized = serde_json::to_vec(self.0.as_ref()).unwrap_or_default();
        let hash = Sha256::digest(&serialized);
        hex::encode(hash)[..8].to_string()
    }

    /// Writable deep copy, detached from the snapshot
    pub fn to_owned_value(&self) -> Value {
        self.0.as_ref().clone()
    }
}

impl Deref for FrozenPlan {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.0
    }
}

impl Serialize for FrozenPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// `diff` section of a run: change summary and touched files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub files: Vec<String>,
}

/// `evidence` section of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub tests: Vec<String>,
    #[serde(default)]
    pub lint: Vec<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

/// Normalized, read-only view of a task and its plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyContext {
    task_id: String,
    request_id: Option<String>,
    topic: Option<String>,
    timestamp: String,
    diff_summary: String,
    files_changed: Vec<String>,
    test_evidence: Vec<String>,
    lint_output: Vec<String>,
    metadata: Map<String, Value>,
    plan: Option<FrozenPlan>,
    manual_approval: bool,
}

impl PolicyContext {
    pub fn builder(task_id: impl Into<String>) -> PolicyContextBuilder {
        PolicyContextBuilder::new(task_id)
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn diff_summary(&self) -> &str {
        &self.diff_summary
    }

    pub fn files_changed(&self) -> &[String] {
        &self.files_changed
    }

    pub fn test_evidence(&self) -> &[String] {
        &self.test_evidence
    }

    pub fn lint_output(&self) -> &[String] {
        &self.lint_output
    }

    /// Merged metadata
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Alias of [`PolicyContext::metadata`]; both return the same map
    pub fn meta(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn plan(&self) -> Option<&FrozenPlan> {
        self.plan.as_ref()
    }

    /// Whether a human explicitly approved touching protected paths
    pub fn manual_approval(&self) -> bool {
        self.manual_approval
    }

    /// `metadata.intent` as a string, if present
    pub fn intent(&self) -> Option<&str> {
        self.metadata.get("intent").and_then(Value::as_str)
    }
}

/// Builder for [`PolicyContext`]
#[derive(Debug, Clone, Default)]
pub struct PolicyContextBuilder {
    task_id: String,
    request_id: Option<String>,
    topic: Option<String>,
    timestamp: Option<String>,
    diff: DiffSummary,
    evidence: Evidence,
    metadata: Map<String, Value>,
    plan: Option<FrozenPlan>,
    manual_approval: bool,
}

impl PolicyContextBuilder {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            ..Default::default()
        }
    }

    pub fn request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn topic(mut self, topic: Option<String>) -> Self {
        self.topic = topic;
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn diff(mut self, diff: DiffSummary) -> Self {
        self.diff = diff;
        self
    }

    pub fn files_changed<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.diff.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn meta_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn plan(mut self, plan: Option<FrozenPlan>) -> Self {
        self.plan = plan;
        self
    }

    pub fn manual_approval(mut self, approved: bool) -> Self {
        self.manual_approval = approved;
        self
    }

    pub fn build(self) -> PolicyContext {
        PolicyContext {
            task_id: self.task_id,
            request_id: self.request_id,
            topic: self.topic,
            timestamp: self
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
            diff_summary: self.diff.summary,
            files_changed: self.diff.files,
            test_evidence: self.evidence.tests,
            lint_output: self.evidence.lint,
            metadata: self.metadata,
            plan: self.plan,
            manual_approval: self.manual_approval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frozen_plan_is_detached_from_source() {
        let mut source = json!({"steps": [{"id": "s1"}]});
        let frozen = FrozenPlan::new(&source);

        source["steps"].as_array_mut().unwrap().push(json!({"id": "s2"}));

        assert_eq!(frozen["steps"].as_array().unwrap().len(), 1);
        assert_eq!(source["steps"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_frozen_plan_owned_copy_is_independent() {
        let frozen = FrozenPlan::new(&json!({"steps": []}));
        let mut copy = frozen.to_owned_value();
        copy["steps"].as_array_mut().unwrap().push(json!(1));
        assert!(frozen["steps"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_digest_is_stable_and_short() {
        let a = FrozenPlan::new(&json!({"steps": [1, 2]}));
        let b = FrozenPlan::new(&json!({"steps": [1, 2]}));
        let c = FrozenPlan::new(&json!({"steps": [2, 1]}));
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 8);
    }

    #[test]
    fn test_meta_and_metadata_are_the_same_map() {
        let ctx = PolicyContext::builder("t-1")
            .meta_entry("intent", json!("bugfix"))
            .build();
        assert_eq!(ctx.intent(), Some("bugfix"));
        assert!(std::ptr::eq(ctx.meta(), ctx.metadata()));
    }

    #[test]
    fn test_builder_fills_timestamp() {
        let ctx = PolicyContext::builder("t-1").build();
        assert!(chrono::DateTime::parse_from_rfc3339(ctx.timestamp()).is_ok());
        let fixed = PolicyContext::builder("t-1").timestamp("2025-10-01T15:00:00Z").build();
        assert_eq!(fixed.timestamp(), "2025-10-01T15:00:00Z");
    }
}
