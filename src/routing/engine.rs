//! Declarative router engine
//!
//! Evaluates a task's signals against the ordered route rules of a
//! [`RouterDocument`]; the first full match wins. When nothing matches the
//! fallback rules are tried in order, and when none of those hold either a
//! synthetic fallback to the default agent is produced. Routing therefore
//! always yields a decision; only loading the document can fail.
//!
//! The document is loaded lazily and cached. Each call compares the file's
//! modification time with the cached one and reloads only on change.
//!
//! # Example
//!
//! ```rust
//! use taskgate::routing::{route_with, RouterDocument};
//! use taskgate::Task;
//!
//! let doc = RouterDocument::from_yaml_str(r#"
//! routes:
//!   - name: precise
//!     match: { intent: rag/search, confidence: ">=0.7" }
//!     target_agent: engineer
//!   - name: broad
//!     match: { intent: rag/search }
//!     target_agent: context
//! "#).unwrap();
//!
//! let low = route_with(&doc, &Task::new("rag/search").with_confidence(0.5));
//! let high = route_with(&doc, &Task::new("rag/search").with_confidence(0.8));
//! assert_eq!(low.target_agent(), Some("context"));
//! assert_eq!(high.target_agent(), Some("engineer"));
//! ```

use super::decision::{
    FallbackTelemetry, ResolvedBudget, RouteTarget, RouteTelemetry, RoutingDecision,
    SignalsSummary,
};
use super::document::{RouterDocument, RouterError};
use crate::task::Task;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tracing::{debug, info};

/// Agent used when neither the document nor the engine names one
pub const DEFAULT_FALLBACK_AGENT: &str = "orchestrator.fallback";

const DEFAULT_FALLBACK_ACTION: &str = "route_to";

/// Normalized routing signals extracted from a task
#[derive(Debug, Clone, PartialEq)]
pub struct Signals<'a> {
    pub intent: Option<&'a str>,
    pub confidence: f64,
    pub artifacts: &'a [String],
    pub thread_state_id: Option<&'a str>,
}

impl<'a> Signals<'a> {
    pub fn from_task(task: &'a Task) -> Self {
        Self {
            intent: task.intent.as_deref(),
            confidence: if task.confidence.is_finite() {
                task.confidence
            } else {
                0.0
            },
            artifacts: &task.artifacts,
            thread_state_id: task.thread_state_id.as_deref(),
        }
    }
}

enum DocumentSource {
    File(PathBuf),
    Static(Arc<RouterDocument>),
}

struct CachedDocument {
    document: Arc<RouterDocument>,
    modified: Option<SystemTime>,
}

/// Router with a lazily loaded, modification-time checked document cache
pub struct RouterEngine {
    source: DocumentSource,
    cache: RwLock<Option<CachedDocument>>,
    default_fallback_agent: String,
}

impl RouterEngine {
    /// Router backed by a document on disk
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: DocumentSource::File(path.into()),
            cache: RwLock::new(None),
            default_fallback_agent: DEFAULT_FALLBACK_AGENT.to_string(),
        }
    }

    /// Router over an in-memory document; loading never fails
    pub fn from_document(document: RouterDocument) -> Self {
        Self {
            source: DocumentSource::Static(Arc::new(document)),
            cache: RwLock::new(None),
            default_fallback_agent: DEFAULT_FALLBACK_AGENT.to_string(),
        }
    }

    /// Set the agent used when the document has no `defaults.fallback_agent`
    pub fn with_default_fallback_agent(mut self, agent: impl Into<String>) -> Self {
        self.default_fallback_agent = agent.into();
        self
    }

    pub fn config_path(&self) -> Option<&Path> {
        match &self.source {
            DocumentSource::File(path) => Some(path),
            DocumentSource::Static(_) => None,
        }
    }

    /// Route a task against the current document
    pub fn route(&self, task: &Task) -> Result<RoutingDecision, RouterError> {
        let document = self.load_config(false)?;
        Ok(evaluate(&document, task, &self.default_fallback_agent))
    }

    /// Return the cached document, reloading when the file changed or when
    /// `force` is set
    pub fn load_config(&self, force: bool) -> Result<Arc<RouterDocument>, RouterError> {
        let path = match &self.source {
            DocumentSource::Static(document) => return Ok(Arc::clone(document)),
            DocumentSource::File(path) => path,
        };

        let modified = std::fs::metadata(path)
            .map_err(|source| RouterError::Read {
                path: path.display().to_string(),
                source,
            })?
            .modified()
            .ok();

        if !force {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.as_ref() {
                if modified.is_some() && cached.modified == modified {
                    debug!(path = %path.display(), "Router document cache hit");
                    return Ok(Arc::clone(&cached.document));
                }
            }
        }

        let document = Arc::new(RouterDocument::load_from_file(path)?);
        info!(
            path = %path.display(),
            routes = document.routes.len(),
            fallbacks = document.fallbacks.len(),
            budgets = document.budgets.len(),
            "Loaded router document"
        );

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = Some(CachedDocument {
            document: Arc::clone(&document),
            modified,
        });

        Ok(document)
    }
}

/// Route a task against a document using the built-in default fallback agent
pub fn route_with(document: &RouterDocument, task: &Task) -> RoutingDecision {
    evaluate(document, task, DEFAULT_FALLBACK_AGENT)
}

/// Resolve a budget by name. An unknown name still resolves, with
/// `constraints = None`.
pub fn resolve_budget(document: &RouterDocument, name: Option<&str>) -> ResolvedBudget {
    match name {
        None => ResolvedBudget::default(),
        Some(name) => ResolvedBudget {
            name: Some(name.to_string()),
            constraints: document.budget(name).cloned(),
        },
    }
}

fn evaluate(document: &RouterDocument, task: &Task, default_agent: &str) -> RoutingDecision {
    let signals = Signals::from_task(task);
    let _span = crate::route_span!(intent = ?signals.intent).entered();

    let matched = document.routes.iter().find(|rule| {
        rule.criteria
            .matches(signals.intent, signals.confidence, signals.artifacts)
    });

    if let Some(rule) = matched {
        let budget_name = rule
            .budget
            .as_deref()
            .or(document.defaults.budget_alias.as_deref());
        let router_rule_id = rule.rule_id();
        debug!(rule = ?router_rule_id, target = ?rule.target_agent, "Route rule matched");

        return RoutingDecision::Route {
            route: RouteTarget {
                name: rule.name.clone(),
                target_agent: rule.target_agent.clone(),
                handoff_template: rule.handoff_template.clone(),
                emit_context: rule
                    .emit_context
                    .clone()
                    .unwrap_or_else(RouteTarget::default_emit_context),
                policy_gates: rule.policy_gates.clone(),
                metrics: rule.metrics.clone(),
            },
            budget: resolve_budget(document, budget_name),
            telemetry: RouteTelemetry {
                router_rule_id,
                thread_state_id: signals.thread_state_id.map(str::to_string),
                signals_summary: SignalsSummary {
                    intent: signals.intent.map(str::to_string),
                    confidence: signals.confidence,
                    artifacts: signals.artifacts.len(),
                },
            },
        };
    }

    let document_default = document.defaults.fallback_agent.as_deref();

    if let Some(fallback) = document
        .fallbacks
        .iter()
        .find(|fallback| fallback.condition.holds(signals.confidence))
    {
        let reason = fallback.condition.label();
        debug!(reason = %reason, "Fallback rule held");
        return RoutingDecision::Fallback {
            action: fallback
                .action
                .clone()
                .unwrap_or_else(|| DEFAULT_FALLBACK_ACTION.to_string()),
            target_agent: fallback
                .target_agent
                .as_deref()
                .or(document_default)
                .unwrap_or(default_agent)
                .to_string(),
            note: fallback.note.clone(),
            telemetry: FallbackTelemetry {
                reason,
                thread_state_id: signals.thread_state_id.map(str::to_string),
            },
        };
    }

    debug!("No route or fallback rule held; using default fallback agent");
    RoutingDecision::Fallback {
        action: DEFAULT_FALLBACK_ACTION.to_string(),
        target_agent: document_default.unwrap_or(default_agent).to_string(),
        note: Some("No declarative rule matched".to_string()),
        telemetry: FallbackTelemetry {
            reason: "no_route".to_string(),
            thread_state_id: signals.thread_state_id.map(str::to_string),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::comparator::FallbackCondition;

    fn doc(yaml: &str) -> RouterDocument {
        RouterDocument::from_yaml_str(yaml).unwrap()
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let document = doc(r#"
routes:
  - name: first
    match: { intent: lint }
    target_agent: rules
  - name: second
    match: { intent: lint }
    target_agent: engineer
"#);
        let decision = route_with(&document, &Task::new("lint"));
        match decision {
            RoutingDecision::Route { route, .. } => {
                assert_eq!(route.name.as_deref(), Some("first"));
                assert_eq!(route.target_agent.as_deref(), Some("rules"));
            }
            other => panic!("Expected route decision, got {other:?}"),
        }
    }

    #[test]
    fn test_confidence_threshold_falls_through_to_later_rule() {
        let document = doc(r#"
routes:
  - name: precise
    match: { intent: rag/search, confidence: ">=0.7" }
    target_agent: engineer
  - name: broad
    match: { intent: rag/search }
    target_agent: context
"#);
        let low = route_with(&document, &Task::new("rag/search").with_confidence(0.5));
        let high = route_with(&document, &Task::new("rag/search").with_confidence(0.8));
        assert_eq!(low.target_agent(), Some("context"));
        assert_eq!(high.target_agent(), Some("engineer"));
    }

    #[test]
    fn test_budget_resolution() {
        let document = doc(r#"
routes:
  - name: named
    match: { intent: a }
    budget: small
  - name: unknown
    match: { intent: b }
    budget: gigantic
  - name: defaulted
    match: { intent: c }
budgets:
  small: { max_tokens: 100 }
  standard: { max_tokens: 1000 }
defaults:
  budget_alias: standard
"#);
        let small = route_with(&document, &Task::new("a"));
        let budget = small.budget().unwrap();
        assert_eq!(budget.name.as_deref(), Some("small"));
        assert_eq!(budget.constraints.as_ref().unwrap()["max_tokens"], 100);

        let unknown = route_with(&document, &Task::new("b"));
        assert!(unknown.budget().unwrap().is_missing());

        let defaulted = route_with(&document, &Task::new("c"));
        assert_eq!(defaulted.budget().unwrap().name.as_deref(), Some("standard"));
    }

    #[test]
    fn test_no_budget_named_resolves_empty() {
        let document = doc("routes:\n  - match: { intent: a }\n    target_agent: x\n");
        let decision = route_with(&document, &Task::new("a"));
        assert_eq!(decision.budget(), Some(&ResolvedBudget::default()));
    }

    #[test]
    fn test_route_telemetry_and_defaults() {
        let document = doc(r#"
routes:
  - name: docs
    match:
      artifacts: { include: ["*.md"] }
    target_agent: doc
    metrics: { route_id: DOC-1 }
"#);
        let task = Task::new("write")
            .with_artifacts(["guide/intro.md", "src/lib.rs"])
            .with_thread_state_id("thread-7")
            .with_confidence(0.3);
        match route_with(&document, &task) {
            RoutingDecision::Route {
                route, telemetry, ..
            } => {
                assert_eq!(route.emit_context["include_payload"], false);
                assert!(route.policy_gates.is_empty());
                assert_eq!(telemetry.router_rule_id.as_deref(), Some("DOC-1"));
                assert_eq!(telemetry.thread_state_id.as_deref(), Some("thread-7"));
                assert_eq!(telemetry.signals_summary.artifacts, 2);
                assert_eq!(telemetry.signals_summary.confidence, 0.3);
            }
            other => panic!("Expected route decision, got {other:?}"),
        }
    }

    #[test]
    fn test_fallback_rules_evaluated_in_order() {
        let document = doc(r#"
routes:
  - match: { intent: never }
fallbacks:
  - condition: "confidence < 0.3"
    action: ask_clarification
    note: Too unsure
  - condition: no_route_matched
    target_agent: generalist
defaults:
  fallback_agent: orchestrator.default
"#);
        match route_with(&document, &Task::new("other").with_confidence(0.1)) {
            RoutingDecision::Fallback {
                action,
                target_agent,
                note,
                telemetry,
            } => {
                assert_eq!(action, "ask_clarification");
                assert_eq!(target_agent, "orchestrator.default");
                assert_eq!(note.as_deref(), Some("Too unsure"));
                assert_eq!(telemetry.reason, "confidence < 0.3");
            }
            other => panic!("Expected fallback, got {other:?}"),
        }

        match route_with(&document, &Task::new("other").with_confidence(0.9)) {
            RoutingDecision::Fallback {
                action,
                target_agent,
                telemetry,
                ..
            } => {
                assert_eq!(action, "route_to");
                assert_eq!(target_agent, "generalist");
                assert_eq!(telemetry.reason, "no_route_matched");
            }
            other => panic!("Expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn test_absolute_fallback_when_nothing_holds() {
        let document = doc(r#"
fallbacks:
  - condition: "confidence > 0.99"
  - condition: "something unparseable"
"#);
        match route_with(&document, &Task::new("x").with_thread_state_id("t")) {
            RoutingDecision::Fallback {
                target_agent,
                telemetry,
                ..
            } => {
                assert_eq!(target_agent, DEFAULT_FALLBACK_AGENT);
                assert_eq!(telemetry.reason, "no_route");
                assert_eq!(telemetry.thread_state_id.as_deref(), Some("t"));
            }
            other => panic!("Expected fallback, got {other:?}"),
        }
        assert_eq!(
            document.fallbacks[1].condition,
            FallbackCondition::Unrecognized("something unparseable".to_string())
        );
    }

    #[test]
    fn test_empty_document_routes_to_configured_default() {
        let engine = RouterEngine::from_document(RouterDocument::default())
            .with_default_fallback_agent("tenant.fallback");
        let decision = engine.route(&Task::default()).unwrap();
        assert!(decision.is_fallback());
        assert_eq!(decision.target_agent(), Some("tenant.fallback"));
    }

    #[test]
    fn test_malformed_comparator_matches_everything() {
        let document = doc(r#"
routes:
  - match: { confidence: "very high" }
    target_agent: permissive
"#);
        let decision = route_with(&document, &Task::new("x").with_confidence(0.0));
        assert_eq!(decision.target_agent(), Some("permissive"));
    }

    #[test]
    fn test_missing_file_is_a_hard_failure() {
        let engine = RouterEngine::from_path("/definitely/not/here/router.yaml");
        let result = engine.route(&Task::new("x"));
        assert!(matches!(result, Err(RouterError::Read { .. })));
    }
}
