//! Confidence comparators used by route matching and fallback conditions.
//!
//! A comparator is parsed once, when the router document is loaded, and is
//! evaluated as a pure predicate afterwards. Parsing never fails: an
//! expression that cannot be understood becomes [`Comparator::AlwaysTrue`].
//! That fail-open mode keeps routing available when a document carries a
//! typo, and it is a named variant so it shows up in review and in tests.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::task::parse_float_prefix;

static COMPARATOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(>=|<=|>|<|==|=)\s*(\d*\.?\d+)$").expect("comparator pattern is valid")
});

static FALLBACK_CONFIDENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^confidence\s*(>=|<=|>|<|==|=)\s*(\d*\.?\d+)$")
        .expect("fallback condition pattern is valid")
});

/// A threshold predicate over a confidence score
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparator {
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
    Eq(f64),
    /// Unparseable or non-numeric expression; matches every value
    AlwaysTrue,
}

impl Comparator {
    /// Parse a textual expression such as `">=0.7"`, `"< 0.3"` or `"0.5"`.
    ///
    /// A bare number implies `>=`.
    pub fn parse(expression: &str) -> Self {
        let trimmed = expression.trim();

        if let Some(captures) = COMPARATOR_RE.captures(trimmed) {
            let threshold: f64 = match captures[2].parse() {
                Ok(value) => value,
                Err(_) => return Comparator::AlwaysTrue,
            };
            return Self::from_operator(&captures[1], threshold);
        }

        // Leading numeric prefix, so "0.5abc" is a 0.5 threshold
        match parse_float_prefix(trimmed) {
            Some(threshold) => Comparator::Gte(threshold),
            None => Comparator::AlwaysTrue,
        }
    }

    /// Parse a comparator from a document value (string or number)
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(number) => number
                .as_f64()
                .map(Comparator::Gte)
                .unwrap_or(Comparator::AlwaysTrue),
            Value::String(expression) => Self::parse(expression),
            _ => Comparator::AlwaysTrue,
        }
    }

    fn from_operator(operator: &str, threshold: f64) -> Self {
        match operator {
            ">" => Comparator::Gt(threshold),
            ">=" => Comparator::Gte(threshold),
            "<" => Comparator::Lt(threshold),
            "<=" => Comparator::Lte(threshold),
            "=" | "==" => Comparator::Eq(threshold),
            _ => Comparator::Gte(threshold),
        }
    }

    /// Evaluate the predicate against a confidence value
    pub fn matches(&self, value: f64) -> bool {
        match *self {
            Comparator::Gt(threshold) => value > threshold,
            Comparator::Gte(threshold) => value >= threshold,
            Comparator::Lt(threshold) => value < threshold,
            Comparator::Lte(threshold) => value <= threshold,
            Comparator::Eq(threshold) => value == threshold,
            Comparator::AlwaysTrue => true,
        }
    }

    pub fn is_always_true(&self) -> bool {
        matches!(self, Comparator::AlwaysTrue)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Gt(t) => write!(f, ">{t}"),
            Comparator::Gte(t) => write!(f, ">={t}"),
            Comparator::Lt(t) => write!(f, "<{t}"),
            Comparator::Lte(t) => write!(f, "<={t}"),
            Comparator::Eq(t) => write!(f, "=={t}"),
            Comparator::AlwaysTrue => write!(f, "*"),
        }
    }
}

impl Serialize for Comparator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Comparator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Comparator::from_value(&value))
    }
}

/// Condition attached to a fallback rule
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FallbackCondition {
    /// No condition given; always holds
    #[default]
    Always,
    /// The literal `no_route_matched`; always holds once fallbacks run
    NoRouteMatched,
    /// `confidence <op> <value>`, with the condition text as written
    Confidence { comparator: Comparator, raw: String },
    /// Anything else; never holds
    Unrecognized(String),
}

impl FallbackCondition {
    pub fn parse(condition: &str) -> Self {
        let trimmed = condition.trim();
        if trimmed.is_empty() {
            return FallbackCondition::Always;
        }
        if trimmed == "no_route_matched" {
            return FallbackCondition::NoRouteMatched;
        }
        if let Some(captures) = FALLBACK_CONFIDENCE_RE.captures(trimmed) {
            return FallbackCondition::Confidence {
                comparator: Comparator::parse(&format!("{}{}", &captures[1], &captures[2])),
                raw: condition.to_string(),
            };
        }
        FallbackCondition::Unrecognized(trimmed.to_string())
    }

    /// Whether the condition holds for the given confidence signal
    pub fn holds(&self, confidence: f64) -> bool {
        match self {
            FallbackCondition::Always | FallbackCondition::NoRouteMatched => true,
            FallbackCondition::Confidence { comparator, .. } => comparator.matches(confidence),
            FallbackCondition::Unrecognized(_) => false,
        }
    }

    /// Label reported in fallback telemetry: the document's text for
    /// confidence and unrecognized conditions
    pub fn label(&self) -> String {
        match self {
            FallbackCondition::Always => "always".to_string(),
            FallbackCondition::NoRouteMatched => "no_route_matched".to_string(),
            FallbackCondition::Confidence { raw, .. } => raw.clone(),
            FallbackCondition::Unrecognized(raw) => raw.clone(),
        }
    }
}

impl Serialize for FallbackCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for FallbackCondition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .map(|condition| FallbackCondition::parse(&condition))
            .unwrap_or_default())
    }
}
