//! Configuration management for windowlimit.
//!
//! Configuration is read from an optional YAML file and then overridden by
//! `WINDOWLIMIT__<SECTION>__<KEY>` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, WindowLimitError};
use crate::ratelimit::{RuleSet, RulesConfig, DEFAULT_REQUESTS_PER_MINUTE};

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "WINDOWLIMIT";

/// Main configuration for windowlimit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowLimitConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// How the client part of a window key is derived
    #[serde(default)]
    pub client_identity: ClientIdentityConfig,

    /// Per-endpoint rules
    #[serde(default)]
    pub rules: RulesConfig,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Whether limits are enforced at startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Quota for endpoints without a specific rule
    #[serde(default = "default_requests_per_minute")]
    pub default_requests_per_minute: u64,

    /// How often expired windows are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_requests_per_minute: default_requests_per_minute(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl LimiterConfig {
    /// Sweep interval as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests_per_minute() -> u64 {
    DEFAULT_REQUESTS_PER_MINUTE
}

fn default_sweep_interval() -> u64 {
    60
}

/// Client identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIdentityConfig {
    /// Use the forwarded-for header instead of the peer address
    #[serde(default)]
    pub trust_forwarded_for: bool,

    /// Header carrying the forwarded client address
    #[serde(default = "default_forwarded_header")]
    pub forwarded_header: String,
}

impl Default for ClientIdentityConfig {
    fn default() -> Self {
        Self {
            trust_forwarded_for: false,
            forwarded_header: default_forwarded_header(),
        }
    }
}

fn default_forwarded_header() -> String {
    "x-forwarded-for".to_string()
}

impl WindowLimitConfig {
    /// Load configuration from an optional file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: WindowLimitConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path, with environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");
        Self::load(Some(path))
    }

    /// Parse configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WindowLimitConfig =
            serde_yaml::from_str(yaml).map_err(|e| WindowLimitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise only fail once the limiter is built.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.sweep_interval_secs == 0 {
            return Err(WindowLimitError::Config(
                "limiter.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.client_identity.trust_forwarded_for
            && self.client_identity.forwarded_header.trim().is_empty()
        {
            return Err(WindowLimitError::Config(
                "client_identity.forwarded_header must be set when trusting it".to_string(),
            ));
        }
        self.rule_set().map(|_| ())
    }

    /// Build the validated rule table.
    pub fn rule_set(&self) -> Result<RuleSet> {
        RuleSet::from_config(&self.rules, self.limiter.default_requests_per_minute)
    }
}
