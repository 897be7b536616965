//! Limiter configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DynamicProperty;
use crate::core::error::ConfigError;

/// Default environment prefix used by [`LimiterConfig::from_env`].
pub const ENV_PREFIX: &str = "PENDING_LIMITER";

/// Static description of an admission limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Hard ceiling reported to monitoring.
    pub max_pending: u64,
    /// Gate for blocking admission. Defaults to `max_pending`.
    #[serde(default)]
    pub threshold: Option<u64>,
    /// How long an admitted operation may hold its slot, in milliseconds.
    pub operation_timeout_ms: u64,
}

/// Live values consumed by the admission controller.
///
/// Each field is read at the moment a decision is made, so calling
/// [`DynamicProperty::set`] on any of them reconfigures a running limiter.
#[derive(Debug, Clone)]
pub struct LimiterLimits {
    /// Gate for blocking admission.
    pub threshold: DynamicProperty<u64>,
    /// Reporting ceiling.
    pub max_capacity: DynamicProperty<u64>,
    /// Per-operation slot timeout.
    pub operation_timeout: DynamicProperty<Duration>,
}

impl LimiterLimits {
    /// Build limits from plain values.
    pub fn new(threshold: u64, max_capacity: u64, operation_timeout: Duration) -> Self {
        Self {
            threshold: DynamicProperty::new(threshold),
            max_capacity: DynamicProperty::new(max_capacity),
            operation_timeout: DynamicProperty::new(operation_timeout),
        }
    }
}

impl LimiterConfig {
    /// Effective threshold.
    #[must_use]
    pub fn effective_threshold(&self) -> u64 {
        self.threshold.unwrap_or(self.max_pending)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending == 0 {
            return Err(ConfigError::Invalid("max_pending must be greater than 0".into()));
        }
        if let Some(threshold) = self.threshold {
            if threshold == 0 {
                return Err(ConfigError::Invalid("threshold must be greater than 0".into()));
            }
            if threshold > self.max_pending {
                return Err(ConfigError::Invalid(format!(
                    "threshold {threshold} exceeds max_pending {}",
                    self.max_pending
                )));
            }
        }
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "operation_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse limiter configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON and
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `PENDING_LIMITER_*` environment variables, reading a `.env`
    /// file first if one exists.
    ///
    /// # Errors
    ///
    /// See [`from_env_with_prefix`](Self::from_env_with_prefix).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Load from `<prefix>_MAX_PENDING`, `<prefix>_THRESHOLD` (optional) and
    /// `<prefix>_OPERATION_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] for absent required variables,
    /// [`ConfigError::Parse`] for non-numeric values and
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| -> Result<Option<u64>, ConfigError> {
            let key = format!("{prefix}_{name}");
            lookup(key.as_str())
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map_err(|e| ConfigError::Parse(format!("{key}: {e}")))
                })
                .transpose()
        };
        let require = |name: &str| -> Result<u64, ConfigError> {
            read(name)?.ok_or_else(|| ConfigError::MissingVar(format!("{prefix}_{name}")))
        };

        let cfg = Self {
            max_pending: require("MAX_PENDING")?,
            threshold: read("THRESHOLD")?,
            operation_timeout_ms: require("OPERATION_TIMEOUT_MS")?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build live limits seeded from this configuration.
    #[must_use]
    pub fn to_limits(&self) -> LimiterLimits {
        LimiterLimits::new(
            self.effective_threshold(),
            self.max_pending,
            Duration::from_millis(self.operation_timeout_ms),
        )
    }
}
