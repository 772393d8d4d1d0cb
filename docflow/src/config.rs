//! Configuration recognized by the orchestrator and the resilience client.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::errors::ConfigError;
use crate::resilience::JitterStrategy;

/// Prefix for every environment variable read by [`PipelineConfig::from_env`].
pub const ENV_PREFIX: &str = "DOCFLOW_";

/// Pipeline and retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Regenerations allowed after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Minimum semantic similarity for a candidate to pass.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Deadline applied to every single completion call.
    #[serde(default = "default_per_stage_timeout")]
    pub per_stage_timeout_seconds: f64,
    /// First delay after a rate-limit response.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_seconds: f64,
    /// Growth factor between consecutive rate-limit delays.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
    /// Rate-limit retries before giving up.
    #[serde(default = "default_backoff_max_attempts")]
    pub backoff_max_attempts: u32,
    /// Step of the linear backoff used for network failures.
    #[serde(default = "default_network_backoff_base")]
    pub network_backoff_base_seconds: f64,
    /// Network-failure retries before giving up.
    #[serde(default = "default_network_max_attempts")]
    pub network_max_attempts: u32,
    /// Longest server `Retry-After` hint honored; longer hints are clamped.
    #[serde(default = "default_max_retry_after")]
    pub max_retry_after_seconds: f64,
    /// Jitter applied to backoff delays.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Sampling temperature for the generator.
    #[serde(default = "default_generator_temperature")]
    pub generator_temperature: f32,
    /// Sampling temperature for the semantic validator.
    #[serde(default = "default_validator_temperature")]
    pub validator_temperature: f32,
    /// Sampling temperature for the optimizer.
    #[serde(default = "default_optimizer_temperature")]
    pub optimizer_temperature: f32,
    /// Completion token ceiling for every call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_retries() -> u32 {
    2
}

fn default_similarity_threshold() -> f64 {
    0.85
}

fn default_per_stage_timeout() -> f64 {
    120.0
}

fn default_backoff_base() -> f64 {
    5.0
}

fn default_backoff_multiplier() -> u32 {
    3
}

fn default_backoff_max_attempts() -> u32 {
    3
}

fn default_network_backoff_base() -> f64 {
    1.0
}

fn default_network_max_attempts() -> u32 {
    3
}

fn default_max_retry_after() -> f64 {
    300.0
}

fn default_generator_temperature() -> f32 {
    0.0
}

fn default_validator_temperature() -> f32 {
    0.0
}

fn default_optimizer_temperature() -> f32 {
    0.4
}

fn default_max_tokens() -> u32 {
    8192
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            similarity_threshold: default_similarity_threshold(),
            per_stage_timeout_seconds: default_per_stage_timeout(),
            backoff_base_seconds: default_backoff_base(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_max_attempts: default_backoff_max_attempts(),
            network_backoff_base_seconds: default_network_backoff_base(),
            network_max_attempts: default_network_max_attempts(),
            max_retry_after_seconds: default_max_retry_after(),
            jitter: JitterStrategy::default(),
            generator_temperature: default_generator_temperature(),
            validator_temperature: default_validator_temperature(),
            optimizer_temperature: default_optimizer_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the regeneration bound.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the similarity threshold.
    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_per_stage_timeout(mut self, timeout: Duration) -> Self {
        self.per_stage_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Sets the rate-limit backoff base, multiplier and retry bound.
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, multiplier: u32, max_attempts: u32) -> Self {
        self.backoff_base_seconds = base.as_secs_f64();
        self.backoff_multiplier = multiplier;
        self.backoff_max_attempts = max_attempts;
        self
    }

    /// Sets the network backoff step and retry bound.
    #[must_use]
    pub fn with_network_backoff(mut self, base: Duration, max_attempts: u32) -> Self {
        self.network_backoff_base_seconds = base.as_secs_f64();
        self.network_max_attempts = max_attempts;
        self
    }

    /// Sets the ceiling on honored `Retry-After` hints.
    #[must_use]
    pub fn with_max_retry_after(mut self, max: Duration) -> Self {
        self.max_retry_after_seconds = max.as_secs_f64();
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Per-call timeout as a `Duration`.
    #[must_use]
    pub fn per_stage_timeout(&self) -> Duration {
        seconds_to_duration(self.per_stage_timeout_seconds)
    }

    /// Rate-limit backoff base as a `Duration`.
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        seconds_to_duration(self.backoff_base_seconds)
    }

    /// Network backoff step as a `Duration`.
    #[must_use]
    pub fn network_backoff_base(&self) -> Duration {
        seconds_to_duration(self.network_backoff_base_seconds)
    }

    /// Ceiling on honored `Retry-After` hints as a `Duration`.
    #[must_use]
    pub fn max_retry_after(&self) -> Duration {
        seconds_to_duration(self.max_retry_after_seconds)
    }

    /// Maximum number of generator invocations in one run.
    #[must_use]
    pub fn max_generation_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::invalid(
                "similarity_threshold",
                format!("{} is outside [0, 1]", self.similarity_threshold),
            ));
        }
        check_seconds("per_stage_timeout_seconds", self.per_stage_timeout_seconds, true)?;
        check_seconds("backoff_base_seconds", self.backoff_base_seconds, false)?;
        if self.backoff_multiplier < 1 {
            return Err(ConfigError::invalid("backoff_multiplier", "must be >= 1"));
        }
        check_seconds(
            "network_backoff_base_seconds",
            self.network_backoff_base_seconds,
            false,
        )?;
        check_seconds("max_retry_after_seconds", self.max_retry_after_seconds, false)?;
        if self.max_tokens == 0 {
            return Err(ConfigError::invalid("max_tokens", "must be positive"));
        }
        for (field, value) in [
            ("generator_temperature", self.generator_temperature),
            ("validator_temperature", self.validator_temperature),
            ("optimizer_temperature", self.optimizer_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::invalid(field, format!("{value} is outside [0, 2]")));
            }
        }
        Ok(())
    }

    /// Loads a configuration from a JSON file; missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from `DOCFLOW_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| lookup(&format!("{ENV_PREFIX}{key}"));

        if let Some(v) = read("MAX_RETRIES") {
            config.max_retries = parse_var("MAX_RETRIES", &v)?;
        }
        if let Some(v) = read("SIMILARITY_THRESHOLD") {
            config.similarity_threshold = parse_var("SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = read("PER_STAGE_TIMEOUT_SECONDS") {
            config.per_stage_timeout_seconds = parse_var("PER_STAGE_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = read("BACKOFF_BASE_SECONDS") {
            config.backoff_base_seconds = parse_var("BACKOFF_BASE_SECONDS", &v)?;
        }
        if let Some(v) = read("BACKOFF_MULTIPLIER") {
            config.backoff_multiplier = parse_var("BACKOFF_MULTIPLIER", &v)?;
        }
        if let Some(v) = read("BACKOFF_MAX_ATTEMPTS") {
            config.backoff_max_attempts = parse_var("BACKOFF_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = read("NETWORK_BACKOFF_BASE_SECONDS") {
            config.network_backoff_base_seconds = parse_var("NETWORK_BACKOFF_BASE_SECONDS", &v)?;
        }
        if let Some(v) = read("NETWORK_MAX_ATTEMPTS") {
            config.network_max_attempts = parse_var("NETWORK_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = read("MAX_RETRY_AFTER_SECONDS") {
            config.max_retry_after_seconds = parse_var("MAX_RETRY_AFTER_SECONDS", &v)?;
        }
        if let Some(v) = read("JITTER") {
            config.jitter = serde_json::from_value(serde_json::Value::String(v.trim().to_string()))
                .map_err(|e| ConfigError::Env {
                    name: format!("{ENV_PREFIX}JITTER"),
                    reason: e.to_string(),
                })?;
        }
        if let Some(v) = read("MAX_TOKENS") {
            config.max_tokens = parse_var("MAX_TOKENS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Connection settings for the HTTP completion transport.
///
/// The API key is never serialized and is redacted from `Debug` output.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API, without the trailing path.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Bearer token; read from `DOCFLOW_API_KEY` by [`ProviderConfig::from_env`].
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Transport-level request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: f64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> f64 {
    120.0
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

impl ProviderConfig {
    /// Creates a config for `base_url` and `model` without a key.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the transport timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Transport timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        seconds_to_duration(self.request_timeout_seconds)
    }

    /// Key under which rate-limit blocks are shared: a short digest of the
    /// API key, so the key itself never lands in logs or maps.
    #[must_use]
    pub fn credential_key(&self) -> String {
        match self.api_key {
            Some(ref key) => {
                let digest = Sha256::digest(key.as_bytes());
                hex::encode(&digest[..8])
            }
            None => "anonymous".to_string(),
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "base_url",
                "must start with http:// or https://",
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model", "must not be empty"));
        }
        check_seconds("request_timeout_seconds", self.request_timeout_seconds, true)?;
        Ok(())
    }

    /// Builds a configuration from `DOCFLOW_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| lookup(&format!("{ENV_PREFIX}{key}"));

        if let Some(v) = read("API_BASE") {
            config.base_url = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = read("MODEL") {
            config.model = v.trim().to_string();
        }
        if let Some(v) = read("API_KEY") {
            let v = v.trim();
            if !v.is_empty() {
                config.api_key = Some(v.to_string());
            }
        }
        if let Some(v) = read("REQUEST_TIMEOUT_SECONDS") {
            config.request_timeout_seconds = parse_var("REQUEST_TIMEOUT_SECONDS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }
}

// Out-of-range values saturate; `validate` rejects them first.
fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(if seconds > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

fn check_seconds(field: &'static str, seconds: f64, positive: bool) -> Result<(), ConfigError> {
    if Duration::try_from_secs_f64(seconds).is_err() {
        return Err(ConfigError::invalid(
            field,
            format!("{seconds} is not a valid number of seconds"),
        ));
    }
    if positive && seconds <= 0.0 {
        return Err(ConfigError::invalid(field, "must be positive"));
    }
    Ok(())
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::Env {
        name: format!("{ENV_PREFIX}{key}"),
        reason: e.to_string(),
    })
}
