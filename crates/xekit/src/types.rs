//! Core types for xe command orchestration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Named parameters passed to an operation.
///
/// A `BTreeMap` so that nothing downstream can depend on hash iteration order.
pub type Params = BTreeMap<String, String>;

/// Opaque object identifier returned by the hypervisor (VM, SR, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap a trimmed token as an identifier.
    ///
    /// Returns `None` for empty tokens or tokens containing whitespace.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self(token.to_string()))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identifier.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check whether a string is usable as an xe parameter name.
///
/// Parameter names become the key half of a `key=value` token, so they may
/// only contain ASCII alphanumerics, `-`, `_` and `:` (map parameters are
/// addressed as `other-config:key`).
pub fn is_valid_param_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
}

/// Best-effort structured view of a composite parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StructuredValue {
    /// Delimited list, e.g. `net1,net2`
    Sequence(Vec<String>),
    /// Delimited `key: value` pairs, e.g. `vcpus: 2; memory: 1024`
    Mapping(BTreeMap<String, String>),
}

/// A VM parameter as returned by `vm-param-get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValue {
    /// Trimmed stdout exactly as the tool printed it
    pub raw: String,
    /// Structured view when the raw value uses a composite delimiter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<StructuredValue>,
}

impl ParameterValue {
    /// Scalar value with no structured view.
    pub fn scalar(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            structured: None,
        }
    }

    /// Items of the sequence view, if the value is a sequence.
    pub fn as_sequence(&self) -> Option<&[String]> {
        match &self.structured {
            Some(StructuredValue::Sequence(items)) => Some(items),
            _ => None,
        }
    }

    /// Entries of the mapping view, if the value is a mapping.
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, String>> {
        match &self.structured {
            Some(StructuredValue::Mapping(map)) => Some(map),
            _ => None,
        }
    }
}

/// Output of a command that reports status text (e.g. `vm-start`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Trimmed stdout
    pub raw: String,
    /// Value halves of the whitespace-separated `key value` pairs
    pub values: Vec<String>,
}

/// Captured outcome of one external process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code, or -1 if the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExecutionResult {
    /// Whether the process exited with code 0.
    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == 0
    }
}

/// Typed record produced by the output parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Output {
    /// A single object identifier
    Identifier(Identifier),
    /// A parameter value with raw and structured views
    Value(ParameterValue),
    /// The command succeeded and has no content of interest
    Success,
    /// Free-form status text
    Status(StatusReport),
}

impl Output {
    /// The string stored in a plan's variable table for this output.
    pub fn to_variable(&self) -> String {
        match self {
            Output::Identifier(id) => id.to_string(),
            Output::Value(value) => value.raw.clone(),
            Output::Success => "Success".to_string(),
            Output::Status(status) => status.raw.clone(),
        }
    }

    /// The identifier, if this output is one.
    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            Output::Identifier(id) => Some(id),
            _ => None,
        }
    }
}

/// Configuration for retry logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_factor,
            max_delay: Duration::from_secs(60),
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        if delay.is_nan() {
            return Duration::ZERO;
        }
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped.max(0.0))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_parse() {
        assert_eq!(
            Identifier::parse("  5f1a-22 \n").map(Identifier::into_string),
            Some("5f1a-22".to_string())
        );
        assert!(Identifier::parse("").is_none());
        assert!(Identifier::parse("two words").is_none());
    }

    #[test]
    fn test_param_name_validation() {
        assert!(is_valid_param_name("name-label"));
        assert!(is_valid_param_name("other-config:auto_poweron"));
        assert!(!is_valid_param_name(""));
        assert!(!is_valid_param_name("name label"));
        assert!(!is_valid_param_name("uuid=abc"));
    }

    #[test]
    fn test_delay_for_attempt_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn test_delay_for_attempt_with_extreme_values() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::MAX,
            backoff_factor: f64::INFINITY,
            max_delay: Duration::MAX,
        };
        assert_eq!(config.delay_for_attempt(4), Duration::MAX);

        let config = RetryConfig {
            base_delay: Duration::ZERO,
            backoff_factor: f64::INFINITY,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn test_output_serializes_structured_view_plainly() {
        let value = ParameterValue {
            raw: "net1,net2".into(),
            structured: Some(StructuredValue::Sequence(vec!["net1".into(), "net2".into()])),
        };
        let json = serde_json::to_value(Output::Value(value)).unwrap();
        assert_eq!(json["kind"], "value");
        assert_eq!(json["value"]["structured"], serde_json::json!(["net1", "net2"]));

        let json = serde_json::to_value(Output::Success).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "success"}));
    }

    #[test]
    fn test_output_to_variable() {
        let id = Identifier::parse("abc").unwrap();
        assert_eq!(Output::Identifier(id).to_variable(), "abc");
        assert_eq!(Output::Success.to_variable(), "Success");
        assert_eq!(
            Output::Value(ParameterValue::scalar("vm1")).to_variable(),
            "vm1"
        );
    }
}
