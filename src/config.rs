//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::pipeline::classifier::DEFAULT_SENDER_DOMAINS;
use crate::pipeline::resolver::ServicesConfig;
use crate::pipeline::retry::RetryPolicy;

/// Whole relay configuration, as read from the YAML document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Delivery targets, global and per kind.
    pub services: ServicesConfig,
    /// Retry and concurrency limits.
    pub dispatch: DispatchConfig,
    /// Classifier inputs.
    pub classifier: ClassifierConfig,
}

impl AppConfig {
    /// Parse a YAML document. An empty document yields the defaults.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }
}

/// Retry policy and concurrency caps for dispatch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Total attempts per target, first included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    /// Concurrent deliveries for one notification.
    pub max_concurrent_dispatches: usize,
    /// Notifications processed at once by a batch run.
    pub max_concurrent_emails: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            jitter: policy.jitter,
            max_concurrent_dispatches: 8,
            max_concurrent_emails: 4,
        }
    }
}

impl DispatchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
            .with_jitter(self.jitter)
    }
}

/// Classifier settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Sender domains accepted as platform notifications (subdomains included).
    pub sender_domains: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sender_domains: DEFAULT_SENDER_DOMAINS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Process-level settings for the binary, built from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// YAML config path (`RELAY_CONFIG`, default `config.yaml`).
    pub config_path: PathBuf,
    /// Directory for daily log files (`RELAY_LOG_DIR`); stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let config_path = lookup("RELAY_CONFIG")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "config.yaml".to_string());

        let log_dir = lookup("RELAY_LOG_DIR")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Self {
            config_path: PathBuf::from(config_path),
            log_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::pipeline::types::NotificationKind;

    const SAMPLE: &str = r#"
services:
  all:
    webhook:
      url: https://example.com/hook
      headers: { Authorization: "Bearer x" }
      timeout: 5
  booking_request:
    webhook: { url: https://example.com/requests }
dispatch:
  max_attempts: 5
  base_delay_ms: 100
  jitter: false
  max_concurrent_emails: 2
classifier:
  sender_domains: [airbnb.com, example-rentals.com]
"#;

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();

        assert_eq!(config.services.global.len(), 1);
        assert_eq!(config.services.global[0].0, "webhook");
        assert_eq!(config.services.scope(NotificationKind::BookingRequest).len(), 1);
        assert_eq!(config.dispatch.max_attempts, 5);
        assert_eq!(config.dispatch.max_concurrent_emails, 2);
        assert_eq!(config.dispatch.max_concurrent_dispatches, 8);
        assert_eq!(
            config.classifier.sender_domains,
            ["airbnb.com", "example-rentals.com"]
        );
    }

    #[test]
    fn dispatch_config_converts_to_policy() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        let policy = config.dispatch.retry_policy();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert!(!policy.jitter);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::from_yaml("").unwrap();
        assert!(config.services.global.is_empty());
        assert_eq!(config.dispatch, DispatchConfig::default());
        assert!(config.classifier.sender_domains.contains(&"airbnb.co.jp".to_string()));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = AppConfig::from_yaml("services: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn unknown_scope_is_parse_error() {
        let err = AppConfig::from_yaml("services:\n  reviews: {}\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(msg) if msg.contains("reviews")));
    }

    #[test]
    fn runtime_config_defaults() {
        let runtime = RuntimeConfig::from_lookup(|_| None);
        assert_eq!(runtime.config_path, PathBuf::from("config.yaml"));
        assert!(runtime.log_dir.is_none());
    }

    #[test]
    fn runtime_config_reads_vars() {
        let runtime = RuntimeConfig::from_lookup(|key| match key {
            "RELAY_CONFIG" => Some("/etc/relay.yaml".into()),
            "RELAY_LOG_DIR" => Some("/var/log/relay".into()),
            _ => None,
        });
        assert_eq!(runtime.config_path, PathBuf::from("/etc/relay.yaml"));
        assert_eq!(runtime.log_dir, Some(PathBuf::from("/var/log/relay")));
    }
}
