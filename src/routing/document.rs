//! Declarative router document
//!
//! The document has four top-level sections: `routes`, `fallbacks`,
//! `budgets` and `defaults`. Rules keep document order; that order is the
//! evaluation order.
//!
//! ```yaml
//! routes:
//!   - name: rag-search-precise
//!     match:
//!       intent: rag/search
//!       confidence: ">=0.7"
//!       artifacts:
//!         include: ["docs/**"]
//!         exclude: ["*.lock"]
//!     target_agent: engineer
//!     budget: small
//!     policy_gates: [planner]
//! fallbacks:
//!   - condition: "confidence < 0.3"
//!     action: ask_clarification
//!     note: Low confidence
//!   - condition: no_route_matched
//!     target_agent: orchestrator.fallback
//! budgets:
//!   small: { max_tokens: 2000, max_steps: 4 }
//! defaults:
//!   budget_alias: small
//!   fallback_agent: orchestrator.fallback
//! ```

use super::comparator::{Comparator, FallbackCondition};
use super::glob::{any_match, GlobPattern};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a router document
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Failed to read router document {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML router document {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to parse TOML router document {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Parsed router configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RouterDocument {
    #[serde(default)]
    pub routes: Vec<RouteRule>,
    #[serde(default)]
    pub fallbacks: Vec<FallbackRule>,
    /// Budget name to constraint map
    #[serde(default)]
    pub budgets: BTreeMap<String, Map<String, Value>>,
    #[serde(default)]
    pub defaults: RouterDefaults,
}

/// `defaults` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RouterDefaults {
    pub budget_alias: Option<String>,
    pub fallback_agent: Option<String>,
}

/// A declarative match-to-action entry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RouteRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "match")]
    pub criteria: MatchCriteria,
    #[serde(default)]
    pub target_agent: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub handoff_template: Option<Value>,
    #[serde(default)]
    pub emit_context: Option<Value>,
    #[serde(default)]
    pub policy_gates: Vec<String>,
    #[serde(default)]
    pub metrics: Map<String, Value>,
}

/// Match criteria of a route rule; every present predicate must hold
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatchCriteria {
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub confidence: Option<Comparator>,
    #[serde(default)]
    pub artifacts: Option<ArtifactConstraint>,
}

/// Include/exclude glob sets over task artifacts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArtifactConstraint {
    #[serde(default, deserialize_with = "one_or_many")]
    pub include: Vec<GlobPattern>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub exclude: Vec<GlobPattern>,
}

/// Secondary rule evaluated only when no route rule matched
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FallbackRule {
    #[serde(default)]
    pub condition: FallbackCondition,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub target_agent: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl MatchCriteria {
    /// Pure evaluation of the three predicates against normalized signals
    pub fn matches(&self, intent: Option<&str>, confidence: f64, artifacts: &[String]) -> bool {
        if let Some(expected) = &self.intent {
            if intent != Some(expected.as_str()) {
                return false;
            }
        }

        if let Some(comparator) = &self.confidence {
            if !comparator.matches(confidence) {
                return false;
            }
        }

        if let Some(constraint) = &self.artifacts {
            if !constraint.matches(artifacts) {
                return false;
            }
        }

        true
    }
}

impl ArtifactConstraint {
    /// At least one artifact must hit an include glob (when any are given)
    /// and no artifact may hit an exclude glob.
    pub fn matches(&self, artifacts: &[String]) -> bool {
        if !self.include.is_empty() && !any_match(&self.include, artifacts) {
            return false;
        }
        if !self.exclude.is_empty() && any_match(&self.exclude, artifacts) {
            return false;
        }
        true
    }
}

impl RouteRule {
    /// Identifier reported in telemetry: `metrics.route_id`, else the rule name
    pub fn rule_id(&self) -> Option<String> {
        self.metrics
            .get("route_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.name.clone())
    }
}

impl RouterDocument {
    /// Load a document from disk. `.yaml`/`.yml` files are parsed as YAML,
    /// everything else as TOML. An empty file is an empty document.
    pub fn load_from_file(path: &Path) -> Result<Self, RouterError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| RouterError::Read {
            path: display.clone(),
            source,
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            Self::from_yaml_str(&content).map_err(|source| RouterError::Yaml {
                path: display,
                source,
            })
        } else {
            Self::from_toml_str(&content).map_err(|source| RouterError::Toml {
                path: display,
                source,
            })
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Look up a budget by name
    pub fn budget(&self, name: &str) -> Option<&Map<String, Value>> {
        self.budgets.get(name)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<GlobPattern>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(GlobPattern),
        Many(Vec<GlobPattern>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(pattern)) => vec![pattern],
        Some(OneOrMany::Many(patterns)) => patterns,
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
routes:
  - name: rag-precise
    match:
      intent: rag/search
      confidence: ">=0.7"
    target_agent: engineer
    budget: small
    metrics:
      route_id: R-001
  - name: docs-only
    match:
      artifacts:
        include: "docs/**"
        exclude: ["*.lock"]
    target_agent: doc
fallbacks:
  - condition: "confidence < 0.3"
    action: ask_clarification
  - condition: no_route_matched
budgets:
  small:
    max_tokens: 2000
    max_steps: 4
defaults:
  budget_alias: small
  fallback_agent: orchestrator.fallback
"#;

    #[test]
    fn test_yaml_document_parses_in_order() {
        let doc = RouterDocument::from_yaml_str(SAMPLE_YAML).unwrap();
        assert_eq!(doc.routes.len(), 2);
        assert_eq!(doc.routes[0].name.as_deref(), Some("rag-precise"));
        assert_eq!(doc.routes[1].name.as_deref(), Some("docs-only"));
        assert_eq!(doc.routes[0].criteria.confidence, Some(Comparator::Gte(0.7)));
        assert_eq!(doc.routes[0].rule_id().as_deref(), Some("R-001"));
        assert_eq!(doc.routes[1].rule_id().as_deref(), Some("docs-only"));
        assert_eq!(doc.fallbacks.len(), 2);
        assert_eq!(doc.fallbacks[1].condition, FallbackCondition::NoRouteMatched);
        assert_eq!(doc.budget("small").unwrap()["max_tokens"], 2000);
        assert_eq!(
            doc.defaults.fallback_agent.as_deref(),
            Some("orchestrator.fallback")
        );
    }

    #[test]
    fn test_single_include_string_is_coerced_to_list() {
        let doc = RouterDocument::from_yaml_str(SAMPLE_YAML).unwrap();
        let artifacts = doc.routes[1].criteria.artifacts.as_ref().unwrap();
        assert_eq!(artifacts.include.len(), 1);
        assert_eq!(artifacts.include[0].as_str(), "docs/**");
        assert_eq!(artifacts.exclude.len(), 1);
    }

    #[test]
    fn test_toml_document_parses() {
        let doc = RouterDocument::from_toml_str(
            r#"
[[routes]]
name = "lint"
target_agent = "rules"
[routes.match]
intent = "lint"
confidence = 0.5

[budgets.small]
max_tokens = 100

[defaults]
fallback_agent = "fallback.agent"
"#,
        )
        .unwrap();
        assert_eq!(doc.routes[0].criteria.confidence, Some(Comparator::Gte(0.5)));
        assert_eq!(doc.budgets.len(), 1);
        assert_eq!(doc.defaults.fallback_agent.as_deref(), Some("fallback.agent"));
    }

    #[test]
    fn test_empty_documents_are_valid() {
        assert_eq!(RouterDocument::from_yaml_str("").unwrap(), RouterDocument::default());
        assert_eq!(RouterDocument::from_toml_str("").unwrap(), RouterDocument::default());
    }

    #[test]
    fn test_artifact_constraint_semantics() {
        let constraint = ArtifactConstraint {
            include: vec!["src/**".into()],
            exclude: vec!["*.lock".into()],
        };
        assert!(constraint.matches(&["src/lib.rs".to_string()]));
        assert!(!constraint.matches(&["docs/a.md".to_string()]));
        assert!(!constraint.matches(&["src/lib.rs".to_string(), "Cargo.lock".to_string()]));
        assert!(!constraint.matches(&[]));

        let exclude_only = ArtifactConstraint {
            include: vec![],
            exclude: vec!["*.lock".into()],
        };
        assert!(exclude_only.matches(&[]));
        assert!(ArtifactConstraint::default().matches(&["anything".to_string()]));
    }

    #[test]
    fn test_match_criteria_requires_all_predicates() {
        let criteria = MatchCriteria {
            intent: Some("rag/search".to_string()),
            confidence: Some(Comparator::Gte(0.7)),
            artifacts: None,
        };
        assert!(criteria.matches(Some("rag/search"), 0.8, &[]));
        assert!(!criteria.matches(Some("rag/search"), 0.5, &[]));
        assert!(!criteria.matches(Some("lint"), 0.9, &[]));
        assert!(!criteria.matches(None, 0.9, &[]));
        assert!(MatchCriteria::default().matches(None, 0.0, &[]));
    }
}
