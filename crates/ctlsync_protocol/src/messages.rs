//! Controller protocol messages.
//!
//! The controller speaks JSON. Every field is optional on the wire: missing
//! (or `null`) lists and maps decode as empty, a missing flag as `false`.

use crate::error::{ProtocolError, ProtocolResult};
use crate::service::{ServiceCredential, ServiceEndpoint, ServiceKey, ServiceMap};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Resource listing connected agents and their endpoints.
pub const AGENT_STATISTICS_PATH: &str = "/api/v1/getAgentStatistics";

/// Resource exchanging a service identity for a URL and token.
pub const GENERATE_CREDENTIALS_PATH: &str = "/api/v1/generateServiceCredentials";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response of the agent statistics resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentStatisticsResponse {
    /// Agents currently connected to the controller.
    #[serde(deserialize_with = "null_as_default")]
    pub connected_agents: Vec<ConnectedAgent>,
}

/// An agent connected to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectedAgent {
    /// Agent name.
    pub name: String,
    /// Agent-level annotations.
    #[serde(deserialize_with = "null_as_default")]
    pub annotations: HashMap<String, String>,
    /// Endpoints the agent exposes.
    #[serde(deserialize_with = "null_as_default")]
    pub endpoints: Vec<AgentEndpoint>,
}

/// An endpoint exposed by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentEndpoint {
    /// Endpoint name.
    pub name: String,
    /// Endpoint type.
    #[serde(rename = "type")]
    pub endpoint_type: String,
    /// Endpoint annotations.
    #[serde(deserialize_with = "null_as_default")]
    pub annotations: HashMap<String, String>,
    /// Whether the endpoint is configured, i.e. eligible for credentials.
    pub configured: bool,
}

impl AgentStatisticsResponse {
    /// Returns the configured endpoints whose type is in `allowed_types`.
    ///
    /// Each endpoint is keyed by `agent:name:type`; if the controller repeats
    /// an identity, the last occurrence wins.
    pub fn configured_services<S: AsRef<str>>(&self, allowed_types: &[S]) -> ServiceMap {
        let mut services = ServiceMap::new();
        for agent in &self.connected_agents {
            for endpoint in &agent.endpoints {
                if !endpoint.configured
                    || !allowed_types
                        .iter()
                        .any(|t| t.as_ref() == endpoint.endpoint_type)
                {
                    continue;
                }
                let service = ServiceEndpoint {
                    agent_name: agent.name.clone(),
                    name: endpoint.name.clone(),
                    service_type: endpoint.endpoint_type.clone(),
                    annotations: endpoint.annotations.clone(),
                };
                services.insert(service.key(), service);
            }
        }
        services
    }
}

/// Request body for the credential generation resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCredentialsRequest {
    /// Agent exposing the service.
    pub agent_name: String,
    /// Service name.
    pub name: String,
    /// Service type.
    #[serde(rename = "type")]
    pub service_type: String,
}

impl ServiceCredentialsRequest {
    /// Builds the request for an endpoint.
    pub fn for_endpoint(endpoint: &ServiceEndpoint) -> Self {
        Self {
            agent_name: endpoint.agent_name.clone(),
            name: endpoint.name.clone(),
            service_type: endpoint.service_type.clone(),
        }
    }

    /// Returns the identity this request is for.
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.agent_name, &self.name, &self.service_type)
    }
}

/// Response of the credential generation resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceCredentialsResponse {
    /// Agent exposing the service.
    pub agent_name: String,
    /// Service name.
    pub name: String,
    /// Service type.
    #[serde(rename = "type")]
    pub service_type: String,
    /// Kind of credential issued.
    pub credential_type: String,
    /// The credential itself.
    pub credential: Credential,
    /// URL the service is reachable at.
    pub url: String,
}

/// Credential body of a [`ServiceCredentialsResponse`].
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credential {
    /// Secret used as the bearer token.
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("password", &"<redacted>")
            .finish()
    }
}

impl From<ServiceCredentialsResponse> for ServiceCredential {
    fn from(response: ServiceCredentialsResponse) -> Self {
        ServiceCredential {
            url: response.url,
            token: response.credential.password,
        }
    }
}

/// Decodes an agent statistics document.
pub fn decode_agent_statistics(bytes: &[u8]) -> ProtocolResult<AgentStatisticsResponse> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::decode("connected agent JSON", e))
}

/// Decodes a credential generation response.
pub fn decode_service_credentials(bytes: &[u8]) -> ProtocolResult<ServiceCredentialsResponse> {
    serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::decode("service credentials JSON", e))
}

/// Encodes a credential generation request.
pub fn encode_credentials_request(request: &ServiceCredentialsRequest) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(request).map_err(|e| ProtocolError::encode("service credentials request", e))
}
