//! Process defaults for exploration
//!
//! Limits set here apply to every scope that does not set its own; per-container and per-scope settings win through
//! [`ScopeConfig::inherit`].

use std::sync::OnceLock;

use lazer_core::ScopeConfig;
use thiserror::Error;

/// Environment variable capping combinations per scope.
pub const ENV_MAX_TOTAL_COUNT: &str = "LAZER_MAX_TOTAL_COUNT";
/// Environment variable capping failing combinations per scope.
pub const ENV_MAX_FAILURE_COUNT: &str = "LAZER_MAX_FAILURE_COUNT";
/// Environment variable making suite runs stop at the first failing combination.
pub const ENV_STOP_ON_FAIL: &str = "LAZER_STOP_ON_FAIL";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Exploration configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LazerConfig {
    /// Limits applied to scopes that set none
    pub scope_defaults: ScopeConfig,
    /// Cancel a suite run at the first failing combination
    pub stop_on_fail: bool,
}

impl LazerConfig {
    /// Create a new config with no limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default total limit
    pub fn with_max_total_count(mut self, count: u64) -> Self {
        self.scope_defaults.max_total_count = Some(count);
        self
    }

    /// Set the default failure limit
    pub fn with_max_failure_count(mut self, count: u64) -> Self {
        self.scope_defaults.max_failure_count = Some(count);
        self
    }

    pub fn with_stop_on_fail(mut self, stop: bool) -> Self {
        self.stop_on_fail = stop;
        self
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new();
        if let Some(value) = lookup(ENV_MAX_TOTAL_COUNT) {
            config = config.with_max_total_count(parse_count(ENV_MAX_TOTAL_COUNT, &value)?);
        }
        if let Some(value) = lookup(ENV_MAX_FAILURE_COUNT) {
            config = config.with_max_failure_count(parse_count(ENV_MAX_FAILURE_COUNT, &value)?);
        }
        if let Some(value) = lookup(ENV_STOP_ON_FAIL) {
            config = config.with_stop_on_fail(parse_flag(ENV_STOP_ON_FAIL, &value)?);
        }
        Ok(config)
    }

    /// The environment configuration, read once per process.
    ///
    /// Invalid overrides are logged and ignored.
    pub fn ambient() -> LazerConfig {
        static AMBIENT: OnceLock<LazerConfig> = OnceLock::new();
        *AMBIENT.get_or_init(|| {
            Self::from_env().unwrap_or_else(|err| {
                tracing::warn!(%err, "ignoring environment configuration");
                Self::new()
            })
        })
    }

    /// `scope` with this config's defaults filling its unset limits.
    pub fn scope_config(&self, scope: ScopeConfig) -> ScopeConfig {
        scope.inherit(&self.scope_defaults)
    }
}

fn parse_count(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: "expected a non-negative integer",
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected a boolean",
        }),
    }
}
