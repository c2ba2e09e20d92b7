//! Runtime configuration, loaded from YAML.
//!
//! ```yaml
//! extraction:
//!   provider: local
//!   model: liquid/lfm-2.5-1.2b-thinking
//!   options:
//!     base_url: http://localhost:11434/v1
//! classification:
//!   provider: openrouter
//!   model: liquid/lfm-2.2-6b
//! ensemble:
//!   temperatures: [0.0, 0.0, 0.0]
//! pipeline:
//!   audit_enabled: true
//!   max_retries: 1
//! retry:
//!   max_retries: 2
//!   base_delay: 5s
//!   factor: 2.0
//! batch:
//!   size: 50
//!   cooldown: 60s
//! feedback:
//!   path: data/reviewer_feedback.jsonl
//!   max_entries: 20
//! ```
//!
//! Every section is optional; missing keys take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::client::InferenceClient;
use crate::providers::{CompletionConfig, ProviderError, ProviderRegistry};
use crate::resilience::RetryPolicy;

/// Durations as human-readable strings ("5s", "1m 30s").
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Provider selection for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Registry key, e.g. `openrouter` or `local`.
    pub provider: String,

    pub model: String,

    pub max_tokens: u32,

    /// Default sampling temperature for this stage.
    pub temperature: f32,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Passed to the provider factory (`api_key`, `base_url`).
    pub options: JsonValue,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::openrouter("liquid/lfm-2.2-6b")
    }
}

impl ProviderSettings {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        let defaults = CompletionConfig::default();
        Self {
            provider: provider.into(),
            model: model.into(),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            timeout: defaults.timeout,
            options: JsonValue::Object(Default::default()),
        }
    }

    pub fn openrouter(model: impl Into<String>) -> Self {
        Self::new("openrouter", model)
    }

    pub fn local(model: impl Into<String>) -> Self {
        Self::new("local", model)
    }

    /// Request defaults for clients built from these settings.
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            json_mode: false,
        }
    }

    /// Create the provider through `registry` and wrap it in a client.
    pub fn build_client(
        &self,
        registry: &ProviderRegistry,
        retry: RetryPolicy,
    ) -> Result<InferenceClient, ProviderError> {
        let provider = registry.create(&self.provider, &self.options)?;
        Ok(InferenceClient::new(provider)
            .with_config(self.completion_config())
            .with_retry(retry))
    }

    fn validate(&self, stage: &str) -> Result<(), ConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{}.provider is empty", stage)));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{}.model is empty", stage)));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid(format!(
                "{}.max_tokens must be positive",
                stage
            )));
        }
        check_temperature(self.temperature, &format!("{}.temperature", stage))
    }
}

fn check_temperature(value: f32, key: &str) -> Result<(), ConfigError> {
    if (0.0..=2.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be within 0.0..=2.0, got {}",
            key, value
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// One entry per member.
    pub temperatures: Vec<f32>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            temperatures: vec![0.0, 0.0, 0.0],
        }
    }
}

impl EnsembleConfig {
    pub fn size(&self) -> usize {
        self.temperatures.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub audit_enabled: bool,

    /// Audit rejections that send the posting back to classification.
    pub max_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            audit_enabled: true,
            max_retries: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Postings processed concurrently.
    pub size: usize,

    /// Pause between batches.
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: 50,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub path: PathBuf,

    /// Corrections loaded into the run snapshot.
    pub max_entries: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/reviewer_feedback.jsonl"),
            max_entries: 20,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub extraction: ProviderSettings,
    pub classification: ProviderSettings,
    pub audit: ProviderSettings,
    pub ensemble: EnsembleConfig,
    pub pipeline: PipelineConfig,
    pub retry: RetryPolicy,
    pub batch: BatchConfig,
    pub feedback: FeedbackConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let mut extraction = ProviderSettings::local("liquid/lfm-2.5-1.2b-thinking");
        extraction.options = serde_json::json!({ "base_url": "http://localhost:11434/v1" });

        Self {
            extraction,
            classification: ProviderSettings::openrouter("liquid/lfm-2.2-6b"),
            audit: ProviderSettings::openrouter("liquid/lfm-2.2-6b"),
            ensemble: EnsembleConfig::default(),
            pipeline: PipelineConfig::default(),
            retry: RetryPolicy::default(),
            batch: BatchConfig::default(),
            feedback: FeedbackConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.extraction.validate("extraction")?;
        self.classification.validate("classification")?;
        self.audit.validate("audit")?;

        if self.ensemble.temperatures.is_empty() {
            return Err(ConfigError::Invalid(
                "ensemble.temperatures needs at least one member".to_string(),
            ));
        }
        for (i, t) in self.ensemble.temperatures.iter().enumerate() {
            check_temperature(*t, &format!("ensemble.temperatures[{}]", i))?;
        }

        if self.retry.factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.factor must be at least 1.0, got {}",
                self.retry.factor
            )));
        }
        if self.batch.size == 0 {
            return Err(ConfigError::Invalid("batch.size must be positive".to_string()));
        }
        if self.feedback.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "feedback.max_entries must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that every stage names a registered provider with usable
    /// options (credentials included).
    pub fn validate_providers(&self, registry: &ProviderRegistry) -> Result<(), ProviderError> {
        for settings in [&self.extraction, &self.classification, &self.audit] {
            registry.validate(&settings.provider, &settings.options)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.extraction.provider, "local");
        assert_eq!(config.classification.model, "liquid/lfm-2.2-6b");
        assert_eq!(config.ensemble.size(), 3);
        assert!(config.pipeline.audit_enabled);
        assert_eq!(config.pipeline.max_retries, 1);
        assert_eq!(config.retry.base_delay, Duration::from_secs(5));
        assert_eq!(config.batch.size, 50);
        assert_eq!(config.batch.cooldown, Duration::from_secs(60));
        assert_eq!(config.feedback.max_entries, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
ensemble:
  temperatures: [0.0, 0.3, 0.7, 1.0, 0.0]
pipeline:
  audit_enabled: false
batch:
  cooldown: 1m 30s
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.ensemble.size(), 5);
        assert!(!config.pipeline.audit_enabled);
        assert_eq!(config.pipeline.max_retries, 1);
        assert_eq!(config.batch.cooldown, Duration::from_secs(90));
        assert_eq!(config.batch.size, 50);
        assert_eq!(config.extraction.model, "liquid/lfm-2.5-1.2b-thinking");
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = RuntimeConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("cooldown: 1m"));
        assert_eq!(RuntimeConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let empty = "ensemble:\n  temperatures: []\n";
        assert!(matches!(
            RuntimeConfig::from_yaml(empty),
            Err(ConfigError::Invalid(_))
        ));

        let hot = "classification:\n  temperature: 3.5\n";
        let err = RuntimeConfig::from_yaml(hot).unwrap_err();
        assert!(err.to_string().contains("classification.temperature"));

        let batch = "batch:\n  size: 0\n";
        assert!(RuntimeConfig::from_yaml(batch).is_err());
    }

    #[test]
    fn test_bad_duration_is_yaml_error() {
        let yaml = "retry:\n  base_delay: soon\n";
        assert!(matches!(
            RuntimeConfig::from_yaml(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_unknown_provider_fails_validation() {
        let mut config = RuntimeConfig::default();
        config.audit.provider = "anthropic".to_string();
        let registry = ProviderRegistry::with_defaults();
        assert!(config.validate_providers(&registry).is_err());
    }

    #[test]
    fn test_build_client_uses_settings() {
        let registry = ProviderRegistry::with_defaults();
        let settings = ProviderSettings::local("tiny-model");
        let client = settings
            .build_client(&registry, RetryPolicy::none())
            .unwrap();
        assert_eq!(client.provider_name(), "local");
        assert_eq!(client.model(), "tiny-model");
    }
}
