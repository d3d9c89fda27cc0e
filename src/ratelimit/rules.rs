//! Per-endpoint quota rules.
//!
//! Each protected resource may carry its own quota. Rules are keyed by path
//! prefix; the longest matching prefix wins and anything unmatched falls back
//! to the default rule.

use serde::{Deserialize, Serialize};

use super::limiter::Quota;
use super::window::TimeWindow;
use crate::error::{Result, WindowLimitError};

/// Requests per minute applied when nothing more specific is configured.
pub const DEFAULT_REQUESTS_PER_MINUTE: u64 = 30;

/// Rule configuration as it appears in configuration files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Rule for paths that match no route
    #[serde(default)]
    pub default: Option<RateLimitRule>,
    /// Path-prefix specific rules
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// A rate limit rule specifying the limit and time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Number of requests allowed per unit of time
    pub requests_per_unit: u64,
    /// The time unit
    #[serde(default = "default_unit")]
    pub unit: TimeUnit,
    /// Optional name/description for this limit
    #[serde(default)]
    pub name: Option<String>,
}

fn default_unit() -> TimeUnit {
    TimeUnit::Minute
}

/// A rule bound to a resource path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Path prefix this rule applies to
    pub path: String,
    #[serde(flatten)]
    pub rule: RateLimitRule,
}

/// Time unit for rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl From<TimeUnit> for TimeWindow {
    fn from(unit: TimeUnit) -> Self {
        match unit {
            TimeUnit::Second => TimeWindow::Second,
            TimeUnit::Minute => TimeWindow::Minute,
            TimeUnit::Hour => TimeWindow::Hour,
            TimeUnit::Day => TimeWindow::Day,
        }
    }
}

/// A validated limit for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointLimit {
    pub name: Option<String>,
    pub quota: Quota,
    pub window: TimeWindow,
}

impl EndpointLimit {
    /// A limit of `requests` per minute.
    pub fn per_minute(requests: u64) -> Result<Self> {
        Ok(Self {
            name: None,
            quota: Quota::new(requests)?,
            window: TimeWindow::Minute,
        })
    }
}

impl TryFrom<&RateLimitRule> for EndpointLimit {
    type Error = WindowLimitError;

    fn try_from(rule: &RateLimitRule) -> Result<Self> {
        let quota = Quota::new(rule.requests_per_unit).map_err(|_| {
            WindowLimitError::Config(format!(
                "rule {} must allow at least one request per {:?}",
                rule.name.as_deref().unwrap_or("<unnamed>"),
                rule.unit
            ))
        })?;
        Ok(Self {
            name: rule.name.clone(),
            quota,
            window: rule.unit.into(),
        })
    }
}

/// Validated rule table used to pick the limit for a resource.
#[derive(Debug, Clone)]
pub struct RuleSet {
    default: EndpointLimit,
    /// Sorted by descending prefix length
    routes: Vec<(String, EndpointLimit)>,
}

impl RuleSet {
    /// Create a rule set with only a default limit.
    pub fn new(default: EndpointLimit) -> Self {
        Self {
            default,
            routes: Vec::new(),
        }
    }

    /// Build a rule set from configuration.
    ///
    /// `default_requests_per_minute` is used when the configuration has no
    /// explicit default rule.
    pub fn from_config(config: &RulesConfig, default_requests_per_minute: u64) -> Result<Self> {
        let default = match &config.default {
            Some(rule) => EndpointLimit::try_from(rule)?,
            None => EndpointLimit::per_minute(default_requests_per_minute)?,
        };

        let mut set = Self::new(default);
        for route in &config.routes {
            if !route.path.starts_with('/') {
                return Err(WindowLimitError::Config(format!(
                    "route path {:?} must start with '/'",
                    route.path
                )));
            }
            set = set.with_route(route.path.clone(), EndpointLimit::try_from(&route.rule)?);
        }
        Ok(set)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str, default_requests_per_minute: u64) -> Result<Self> {
        let config: RulesConfig = serde_yaml::from_str(yaml)
            .map_err(|e| WindowLimitError::Config(format!("Failed to parse rate limit rules: {}", e)))?;
        Self::from_config(&config, default_requests_per_minute)
    }

    /// Add a limit for a path prefix, replacing any existing one for it.
    pub fn with_route(mut self, prefix: impl Into<String>, limit: EndpointLimit) -> Self {
        let prefix = prefix.into();
        self.routes.retain(|(existing, _)| *existing != prefix);
        self.routes.push((prefix, limit));
        self.routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Find the limit for a resource path.
    pub fn resolve(&self, path: &str) -> &EndpointLimit {
        self.routes
            .iter()
            .find(|(prefix, _)| prefix_matches(prefix, path))
            .map(|(_, limit)| limit)
            .unwrap_or(&self.default)
    }

    /// The fallback limit.
    pub fn default_limit(&self) -> &EndpointLimit {
        &self.default
    }

    /// Configured routes, most specific first.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &EndpointLimit)> {
        self.routes.iter().map(|(prefix, limit)| (prefix.as_str(), limit))
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(EndpointLimit {
            name: None,
            quota: Quota::default(),
            window: TimeWindow::Minute,
        })
    }
}

/// Segment-aware prefix match: `/api` covers `/api` and `/api/x` but not `/apix`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}
