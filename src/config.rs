//! Runtime settings for the gate
//!
//! Loaded from a TOML (or YAML) file, then overridden by environment
//! variables:
//!
//! | Variable | Setting |
//! |---|---|
//! | `TASKGATE_ROUTER_CONFIG` | `router.config_path` |
//! | `TASK_RATE_LIMIT_WINDOW_MS` | `rate_limit.window_ms` |
//! | `TASK_RATE_LIMIT_MAX_REQUESTS` | `rate_limit.max_requests` |
//! | `TASK_META_OVER_PLAN` | `policy_context.task_meta_over_plan` (`0` means plan wins) |

use crate::policy::DEFAULT_PROTECTED_PATHS;
use crate::routing::{GlobPattern, DEFAULT_FALLBACK_AGENT};
use crate::runner::context_builder::{debug_flag, DEFAULT_META_KEYS};
use crate::runner::{ContextSettings, MetaPrecedence};
use crate::runner::{DEFAULT_RATE_LIMIT_MAX_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW_MS};
use crate::handoff::DEFAULT_TTL_MS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GateConfig {
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub policy_context: PolicyContextSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub handoff: HandoffSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterSection {
    /// Router document (YAML or TOML)
    #[serde(default = "default_router_config_path")]
    pub config_path: PathBuf,
    /// Agent used by the absolute fallback
    #[serde(default = "default_fallback_agent")]
    pub default_fallback_agent: String,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            config_path: default_router_config_path(),
            default_fallback_agent: default_fallback_agent(),
        }
    }
}

fn default_router_config_path() -> PathBuf {
    PathBuf::from("router.yaml")
}

fn default_fallback_agent() -> String {
    DEFAULT_FALLBACK_AGENT.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitSection {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_window_ms() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_MS
}

fn default_max_requests() -> usize {
    DEFAULT_RATE_LIMIT_MAX_REQUESTS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyContextSection {
    /// Task metadata wins over plan metadata on key collision
    #[serde(default = "default_true")]
    pub task_meta_over_plan: bool,
    #[serde(default = "default_allowed_meta_keys")]
    pub allowed_meta_keys: Vec<String>,
}

impl Default for PolicyContextSection {
    fn default() -> Self {
        Self {
            task_meta_over_plan: true,
            allowed_meta_keys: default_allowed_meta_keys(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_allowed_meta_keys() -> Vec<String> {
    DEFAULT_META_KEYS.iter().map(|k| k.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicySection {
    /// Globs guarded by the sensitive-path policy
    #[serde(default = "default_protected_paths")]
    pub protected_paths: Vec<String>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            protected_paths: default_protected_paths(),
        }
    }
}

fn default_protected_paths() -> Vec<String> {
    DEFAULT_PROTECTED_PATHS.iter().map(|p| p.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffSection {
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,
}

impl Default for HandoffSection {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
        }
    }
}

fn default_ttl_ms() -> u64 {
    DEFAULT_TTL_MS
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GateConfig {
    /// Load settings from a file, apply environment overrides and validate.
    ///
    /// `.yaml`/`.yml` files are parsed as YAML, everything else as TOML.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: GateConfig = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };

        config.apply_env_overrides()?;
        config.validate()?;

        info!(path = %path.display(), "Loaded gate configuration");
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TASKGATE_ROUTER_CONFIG") {
            self.router.config_path = PathBuf::from(path);
        }
        if let Some(value) = lookup("TASK_RATE_LIMIT_WINDOW_MS") {
            self.rate_limit.window_ms = parse_env("TASK_RATE_LIMIT_WINDOW_MS", &value)?;
        }
        if let Some(value) = lookup("TASK_RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = parse_env("TASK_RATE_LIMIT_MAX_REQUESTS", &value)?;
        }
        if let Some(value) = lookup("TASK_META_OVER_PLAN") {
            self.policy_context.task_meta_over_plan = value != "0";
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.window_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "rate_limit.window_ms must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidConfig(
                "rate_limit.max_requests must be greater than 0".to_string(),
            ));
        }
        if self.router.default_fallback_agent.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "router.default_fallback_agent must not be empty".to_string(),
            ));
        }
        if self.handoff.default_ttl_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "handoff.default_ttl_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn protected_paths(&self) -> Vec<GlobPattern> {
        self.policy
            .protected_paths
            .iter()
            .map(|pattern| GlobPattern::new(pattern))
            .collect()
    }

    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            precedence: MetaPrecedence::from_flag(self.policy_context.task_meta_over_plan),
            allowed_meta_keys: self.policy_context.allowed_meta_keys.iter().cloned().collect(),
            debug: debug_flag(),
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert_eq!(config.router.default_fallback_agent, "orchestrator.fallback");
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.rate_limit.max_requests, 60);
        assert!(config.policy_context.task_meta_over_plan);
        assert_eq!(config.policy_context.allowed_meta_keys.len(), 7);
        assert_eq!(config.policy.protected_paths.len(), 3);
        assert_eq!(config.handoff.default_ttl_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GateConfig = toml::from_str(
            r#"
[rate_limit]
max_requests = 5

[policy]
protected_paths = ["infra/**"]
"#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.policy.protected_paths, vec!["infra/**"]);
        assert!(config.protected_paths()[0].is_match("infra/main.tf"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GateConfig::default();
        config
            .apply_overrides_from(env_of(&[
                ("TASK_RATE_LIMIT_WINDOW_MS", "1000"),
                ("TASK_RATE_LIMIT_MAX_REQUESTS", "3"),
                ("TASK_META_OVER_PLAN", "0"),
                ("TASKGATE_ROUTER_CONFIG", "/etc/taskgate/router.toml"),
            ]))
            .unwrap();

        assert_eq!(config.rate_limit.window_ms, 1000);
        assert_eq!(config.rate_limit.max_requests, 3);
        assert!(!config.policy_context.task_meta_over_plan);
        assert_eq!(
            config.context_settings().precedence,
            MetaPrecedence::PlanOverTask
        );
        assert_eq!(
            config.router.config_path,
            PathBuf::from("/etc/taskgate/router.toml")
        );
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = GateConfig::default();
        let error = config
            .apply_overrides_from(env_of(&[("TASK_RATE_LIMIT_MAX_REQUESTS", "many")]))
            .unwrap_err();
        assert!(matches!(
            error,
            ConfigError::InvalidEnv {
                name: "TASK_RATE_LIMIT_MAX_REQUESTS",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = GateConfig::default();
        config.rate_limit.window_ms = 0;
        assert!(config.validate().is_err());

        let mut config = GateConfig::default();
        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());

        let mut config = GateConfig::default();
        config.router.default_fallback_agent = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file: NamedTempFile = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "router:\n  default_fallback_agent: triage\nhandoff:\n  default_ttl_ms: 500").unwrap();

        let config = GateConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.router.default_fallback_agent, "triage");
        assert_eq!(config.handoff.default_ttl_ms, 500);
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = GateConfig::load_from_file(Path::new("/nonexistent/taskgate.toml"));
        assert!(matches!(result, Err(ConfigError::FileRead(_))));
    }
}
