//! Crate-wide error type
//!
//! Each component has its own error enum; [`GateError`] wraps them for
//! callers that drive several components (the CLI, embedding services).
//! Policy violations are not errors at this level: the runner reports them
//! inside its outcome.

use crate::config::ConfigError;
use crate::handoff::HandoffError;
use crate::policy::PolicyError;
use crate::routing::RouterError;
use crate::runner::RunnerError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const MAX_MESSAGE_LEN: usize = 500;
const TRUNCATE_SUFFIX: &str = "...[truncated]";

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("sensitive path pattern is valid")
});

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Handoff error: {0}")]
    Handoff(#[from] HandoffError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GateError {
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Display text safe to log or return to an outer caller
    pub fn sanitized_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

/// Redact secret-looking values and sensitive paths, then cap the length
pub fn sanitize_error_message(message: &str) -> String {
    let redacted = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&redacted, "/***REDACTED***/")
        .into_owned();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN - TRUNCATE_SUFFIX.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(TRUNCATE_SUFFIX);
    }

    sanitized
}

/// Result type for gate operations
pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyViolation;

    #[test]
    fn test_secrets_are_redacted() {
        let error = GateError::internal("Failed to authenticate: password=secret123 token=abc456");
        let message = error.sanitized_message();

        assert!(!message.contains("secret123"));
        assert!(!message.contains("abc456"));
        assert!(message.contains("password=***"));
        assert!(message.contains("token=***"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"é".repeat(400));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_exactly_500_chars_untouched() {
        let sanitized = sanitize_error_message(&"x".repeat(500));
        assert_eq!(sanitized.len(), 500);
        assert!(!sanitized.contains("truncated"));
    }

    #[test]
    fn test_file_path_redaction() {
        let sanitized =
            sanitize_error_message("Failed to read /home/user/.ssh/id_rsa and /home/user/.aws/credentials");
        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("id_rsa"));
        assert!(!sanitized.contains(".aws/credentials"));
    }

    #[test]
    fn test_case_insensitive_and_colons() {
        let sanitized = sanitize_error_message("PASSWORD: hunter2 Key=xyz");
        assert!(!sanitized.contains("hunter2"));
        assert!(!sanitized.contains("xyz"));
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(sanitize_error_message(""), "");
    }

    #[test]
    fn test_component_errors_convert() {
        let error: GateError = PolicyError::from(PolicyViolation::new("p", "denied")).into();
        assert!(matches!(error, GateError::Policy(_)));
        assert_eq!(error.to_string(), "Policy error: Policy violation (p): denied");

        let error: GateError = RunnerError::invalid_input("bad").into();
        assert!(error.sanitized_message().contains("bad"));
    }
}
