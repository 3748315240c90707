//! Service identity and credential types.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Services reported by one listing, keyed by identity.
///
/// Ordered so that events produced from a listing come out in a stable order.
pub type ServiceMap = BTreeMap<ServiceKey, ServiceEndpoint>;

/// Composite identity of a service: `agent:name:type`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceKey(String);

impl ServiceKey {
    /// Builds the key for a service exposed by an agent.
    pub fn new(agent_name: &str, name: &str, service_type: &str) -> Self {
        Self(format!("{agent_name}:{name}:{service_type}"))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A configured endpoint as reported by the controller's agent listing.
///
/// Carries no credential; those are exchanged separately, once per service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceEndpoint {
    /// Name of the agent exposing the service.
    pub agent_name: String,
    /// Service name.
    pub name: String,
    /// Service type.
    pub service_type: String,
    /// Free-form annotations attached to the endpoint.
    pub annotations: HashMap<String, String>,
}

impl ServiceEndpoint {
    /// Creates an endpoint without annotations.
    pub fn new(
        agent_name: impl Into<String>,
        name: impl Into<String>,
        service_type: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            name: name.into(),
            service_type: service_type.into(),
            annotations: HashMap::new(),
        }
    }

    /// Adds an annotation.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Returns this endpoint's identity.
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.agent_name, &self.name, &self.service_type)
    }
}

/// URL and access token issued by the controller for one service.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ServiceCredential {
    /// URL the service is reachable at.
    pub url: String,
    /// Bearer token for the service.
    pub token: String,
}

impl ServiceCredential {
    /// Creates a credential.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }
}

// Tokens stay out of logs.
impl fmt::Debug for ServiceCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredential")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}
