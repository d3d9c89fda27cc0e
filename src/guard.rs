//! Pre-handler guard that turns limiter decisions into response metadata.
//!
//! The guard is transport-agnostic: the caller hands over the peer address,
//! the forwarded-for header value (if any) and the request path, and gets back
//! whether to run the handler plus the headers to attach.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::{ClientIdentityConfig, WindowLimitConfig};
use crate::error::Result;
use crate::ratelimit::{Admission, RateLimiter, RuleSet, WindowKey};

/// Header advertising the window length, e.g. `1m`.
pub const LIMIT_HEADER: &str = "x-rate-limit-limit";
/// Header advertising the requests left in the window.
pub const REMAINING_HEADER: &str = "x-rate-limit-remaining";
/// Status returned for rejected requests.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Decides which address identifies the client.
#[derive(Debug, Clone)]
pub struct ClientIdentityPolicy {
    trust_forwarded_for: bool,
    forwarded_header: String,
}

impl ClientIdentityPolicy {
    /// Only ever use the peer address.
    pub fn peer_only() -> Self {
        Self::from_config(&ClientIdentityConfig::default())
    }

    pub fn from_config(config: &ClientIdentityConfig) -> Self {
        Self {
            trust_forwarded_for: config.trust_forwarded_for,
            forwarded_header: config.forwarded_header.to_ascii_lowercase(),
        }
    }

    /// Name of the header the caller should pass to [`resolve`](Self::resolve).
    pub fn forwarded_header(&self) -> &str {
        &self.forwarded_header
    }

    /// Pick the client identity for a request.
    ///
    /// The forwarded value is only consulted when trusted; its first non-empty
    /// entry is the originating client. Without a usable address the identity
    /// is the empty string.
    pub fn resolve(&self, remote: Option<IpAddr>, forwarded: Option<&str>) -> String {
        if self.trust_forwarded_for {
            let first = forwarded
                .and_then(|value| value.split(',').map(str::trim).find(|entry| !entry.is_empty()));
            if let Some(client) = first {
                return client.to_string();
            }
        }
        remote.map(|ip| ip.to_string()).unwrap_or_default()
    }
}

impl Default for ClientIdentityPolicy {
    fn default() -> Self {
        Self::peer_only()
    }
}

/// What the request pipeline should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Run the handler and attach the headers to its response.
    Proceed { headers: Vec<(&'static str, String)> },
    /// Skip the handler and answer with `status`.
    Reject {
        status: u16,
        headers: Vec<(&'static str, String)>,
    },
}

impl GuardDecision {
    fn from_admission(admission: &Admission) -> Self {
        if !admission.enforced {
            return GuardDecision::Proceed { headers: Vec::new() };
        }

        let headers = vec![
            (LIMIT_HEADER, admission.window.label()),
            (REMAINING_HEADER, admission.remaining.to_string()),
        ];
        if admission.allowed {
            GuardDecision::Proceed { headers }
        } else {
            GuardDecision::Reject {
                status: TOO_MANY_REQUESTS,
                headers,
            }
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Proceed { .. })
    }

    pub fn headers(&self) -> &[(&'static str, String)] {
        match self {
            GuardDecision::Proceed { headers } | GuardDecision::Reject { headers, .. } => headers,
        }
    }

    /// Status to answer with, if the handler must not run.
    pub fn status(&self) -> Option<u16> {
        match self {
            GuardDecision::Proceed { .. } => None,
            GuardDecision::Reject { status, .. } => Some(*status),
        }
    }
}

/// Per-request rate limit check for a routing layer.
pub struct RequestGuard {
    limiter: Arc<RateLimiter>,
    rules: RuleSet,
    identity: ClientIdentityPolicy,
}

impl RequestGuard {
    pub fn new(limiter: Arc<RateLimiter>, rules: RuleSet, identity: ClientIdentityPolicy) -> Self {
        Self {
            limiter,
            rules,
            identity,
        }
    }

    /// Build a guard from configuration around a shared limiter.
    ///
    /// The limiter's enforcement flag is set from `limiter.enabled`.
    pub fn from_config(config: &WindowLimitConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let rules = config.rule_set()?;
        limiter.set_enabled(config.limiter.enabled);
        Ok(Self::new(
            limiter,
            rules,
            ClientIdentityPolicy::from_config(&config.client_identity),
        ))
    }

    /// Check a request from its transport details.
    pub fn inspect(&self, remote: Option<IpAddr>, forwarded: Option<&str>, path: &str) -> GuardDecision {
        let client = self.identity.resolve(remote, forwarded);
        self.check(&client, path)
    }

    /// Check a request for an already resolved client identity.
    pub fn check(&self, client: &str, path: &str) -> GuardDecision {
        let limit = self.rules.resolve(path);
        let key = WindowKey::new(client, path);

        trace!(key = %key, rule = ?limit.name, "Inspecting request");
        let admission = self.limiter.admit(&key, limit.quota, limit.window);
        let decision = GuardDecision::from_admission(&admission);
        if !decision.is_allowed() {
            debug!(key = %key, "Short-circuiting rate limited request");
        }
        decision
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn identity(&self) -> &ClientIdentityPolicy {
        &self.identity
    }
}
