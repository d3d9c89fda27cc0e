//! Window key generation and handling.

use std::fmt;

/// A key that scopes one fixed-window counter.
///
/// The key is composed of the client identity (typically an IP address) and
/// the resource being requested (typically a path). Two keys are the same
/// counter only if both parts are equal; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// Who is making the request
    pub client: String,
    /// What is being requested
    pub resource: String,
}

impl WindowKey {
    /// Create a new window key from a client identity and a resource.
    pub fn new(client: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            resource: resource.into(),
        }
    }

}

/// Renders the plain concatenation of client and resource, for logging.
impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.client, self.resource)
    }
}
