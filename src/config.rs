//! Provider configuration.
//!
//! The orchestrator passes provider configuration as JSON to
//! [`ProviderService::configure`](crate::ProviderService::configure). Every
//! field is optional:
//!
//! ```json
//! {
//!   "initial_delay_ms": 200,
//!   "max_delay_ms": 10000,
//!   "multiplier": 2.0,
//!   "timeout_secs": 120,
//!   "page_size": 50
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::retry::RetryOptions;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};

/// Settings applied to every lifecycle operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// First retry delay, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on a single retry delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff growth factor.
    pub multiplier: f64,
    /// Wall-clock budget for one operation's retries, in seconds.
    pub timeout_secs: u64,
    /// Items requested per list page. Unset leaves it to the service.
    pub page_size: Option<usize>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 200,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            timeout_secs: 120,
            page_size: None,
        }
    }
}

impl ProviderConfig {
    /// Parse configuration; `null` yields the defaults.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|e| ProviderError::Configuration(e.to_string()))
    }

    /// Range checks that serde cannot express.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if self.initial_delay_ms == 0 {
            diagnostics.push(
                Diagnostic::error("initial_delay_ms must be positive")
                    .with_attribute("initial_delay_ms"),
            );
        }
        if self.max_delay_ms < self.initial_delay_ms {
            diagnostics.push(
                Diagnostic::error("max_delay_ms must not be below initial_delay_ms")
                    .with_attribute("max_delay_ms"),
            );
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            diagnostics.push(
                Diagnostic::error("multiplier must be at least 1.0").with_attribute("multiplier"),
            );
        }
        if self.timeout_secs == 0 {
            diagnostics.push(
                Diagnostic::error("timeout_secs must be positive").with_attribute("timeout_secs"),
            );
        }
        if self.page_size == Some(0) {
            diagnostics.push(
                Diagnostic::error("page_size must be positive").with_attribute("page_size"),
            );
        }
        let timeout = Duration::from_secs(self.timeout_secs);
        if self.timeout_secs > 0 && timeout < Duration::from_millis(self.initial_delay_ms) {
            diagnostics.push(
                Diagnostic::warning("timeout_secs is shorter than the first retry delay")
                    .with_detail("operations will not be retried")
                    .with_attribute("timeout_secs"),
            );
        }
        diagnostics
    }

    /// Retry options derived from this configuration.
    pub fn retry_options(&self) -> RetryOptions {
        RetryOptions::new()
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_multiplier(self.multiplier)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }

    /// Schema of the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Retry and paging settings for the logs provider")
            .with_attribute(
                "initial_delay_ms",
                Attribute::optional_int64().with_description("First retry delay in milliseconds"),
            )
            .with_attribute(
                "max_delay_ms",
                Attribute::optional_int64().with_description("Largest retry delay in milliseconds"),
            )
            .with_attribute(
                "multiplier",
                Attribute::new(AttributeType::Float64, AttributeFlags::optional())
                    .with_description("Backoff growth factor"),
            )
            .with_attribute(
                "timeout_secs",
                Attribute::optional_int64()
                    .with_description("Retry budget per operation in seconds"),
            )
            .with_attribute(
                "page_size",
                Attribute::optional_int64().with_description("Items per list page"),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_default() {
        assert_eq!(
            ProviderConfig::from_value(Value::Null).unwrap(),
            ProviderConfig::default()
        );
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config =
            ProviderConfig::from_value(json!({"timeout_secs": 5, "page_size": 10})).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.page_size, Some(10));
        assert_eq!(config.initial_delay_ms, 200);
        assert!(config.diagnostics().is_empty());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = ProviderConfig::from_value(json!({"region": "us-east-1"})).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn test_range_checks() {
        let config = ProviderConfig {
            initial_delay_ms: 500,
            max_delay_ms: 100,
            multiplier: 0.5,
            page_size: Some(0),
            ..Default::default()
        };
        let attributes: Vec<_> = config
            .diagnostics()
            .into_iter()
            .filter(Diagnostic::is_error)
            .filter_map(|d| d.attribute)
            .collect();
        assert_eq!(attributes, vec!["max_delay_ms", "multiplier", "page_size"]);
    }

    #[test]
    fn test_short_timeout_warns() {
        let config = ProviderConfig {
            initial_delay_ms: 5_000,
            max_delay_ms: 10_000,
            timeout_secs: 1,
            ..Default::default()
        };
        let diagnostics = config.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].is_error());
    }

    #[test]
    fn test_retry_options() {
        let options = ProviderConfig::default().retry_options();
        assert_eq!(options.backoff(0), Duration::from_millis(200));
    }

    #[test]
    fn test_huge_timeout_is_accepted() {
        let config = ProviderConfig::from_value(json!({"timeout_secs": u64::MAX})).unwrap();
        assert!(config.diagnostics().is_empty());
        assert_eq!(config.retry_options().timeout, Duration::from_secs(u64::MAX));
    }
}
