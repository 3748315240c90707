//! Transport layer abstraction for controller calls.

use crate::error::SyncResult;
use async_trait::async_trait;
use ctlsync_protocol::{
    AgentEndpoint, AgentStatisticsResponse, ConnectedAgent, ServiceCredential, ServiceEndpoint,
    ServiceKey, ServiceMap,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A controller transport performs the two remote calls the engine needs.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (mutual-TLS HTTP, in-memory mock for testing, etc.).
#[async_trait]
pub trait ControllerTransport: Send + Sync {
    /// Lists the configured endpoints of connected agents whose type is in
    /// `allowed_types`.
    async fn list_endpoints(&self, allowed_types: &[String]) -> SyncResult<ServiceMap>;

    /// Exchanges an endpoint's identity for its URL and token.
    ///
    /// The controller issues the token at request time; callers make this call
    /// once per newly discovered service.
    async fn fetch_credential(&self, endpoint: &ServiceEndpoint) -> SyncResult<ServiceCredential>;
}

#[async_trait]
impl<T: ControllerTransport + ?Sized> ControllerTransport for Arc<T> {
    async fn list_endpoints(&self, allowed_types: &[String]) -> SyncResult<ServiceMap> {
        (**self).list_endpoints(allowed_types).await
    }

    async fn fetch_credential(&self, endpoint: &ServiceEndpoint) -> SyncResult<ServiceCredential> {
        (**self).fetch_credential(endpoint).await
    }
}

/// A mock transport for testing.
///
/// Answers listings from a scripted [`AgentStatisticsResponse`] (filtered the
/// same way the real controller response is) and issues a deterministic
/// credential per service unless one was set or failed explicitly.
#[derive(Debug, Default)]
pub struct MockTransport {
    listing: Mutex<Option<SyncResult<AgentStatisticsResponse>>>,
    credentials: Mutex<HashMap<ServiceKey, SyncResult<ServiceCredential>>>,
    list_calls: AtomicUsize,
    credential_requests: Mutex<Vec<ServiceKey>>,
}

impl MockTransport {
    /// Creates a mock controller with no connected agents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the agent statistics document returned by listings.
    pub fn set_agents(&self, response: AgentStatisticsResponse) {
        *self.listing.lock() = Some(Ok(response));
    }

    /// Reports the given endpoints as configured, grouped by agent.
    pub fn set_endpoints(&self, endpoints: impl IntoIterator<Item = ServiceEndpoint>) {
        let mut agents: BTreeMap<String, Vec<AgentEndpoint>> = BTreeMap::new();
        for endpoint in endpoints {
            agents
                .entry(endpoint.agent_name)
                .or_default()
                .push(AgentEndpoint {
                    name: endpoint.name,
                    endpoint_type: endpoint.service_type,
                    annotations: endpoint.annotations,
                    configured: true,
                });
        }
        self.set_agents(AgentStatisticsResponse {
            connected_agents: agents
                .into_iter()
                .map(|(name, endpoints)| ConnectedAgent {
                    name,
                    annotations: HashMap::new(),
                    endpoints,
                })
                .collect(),
        });
    }

    /// Makes every following listing fail with `error`.
    pub fn fail_listing(&self, error: crate::SyncError) {
        *self.listing.lock() = Some(Err(error));
    }

    /// Sets the credential issued for a service.
    pub fn set_credential(&self, key: ServiceKey, credential: ServiceCredential) {
        self.credentials.lock().insert(key, Ok(credential));
    }

    /// Makes credential requests for a service fail with `error`.
    pub fn fail_credential(&self, key: ServiceKey, error: crate::SyncError) {
        self.credentials.lock().insert(key, Err(error));
    }

    /// Forgets any credential set or failed for a service.
    pub fn reset_credential(&self, key: &ServiceKey) {
        self.credentials.lock().remove(key);
    }

    /// Returns the number of listings performed.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Returns every credential request made, in order.
    pub fn credential_requests(&self) -> Vec<ServiceKey> {
        self.credential_requests.lock().clone()
    }

    /// Credential issued when none was scripted.
    pub fn default_credential(endpoint: &ServiceEndpoint) -> ServiceCredential {
        ServiceCredential::new(
            format!("https://{}.{}.example", endpoint.name, endpoint.agent_name),
            format!("token-{}", endpoint.key()),
        )
    }
}

#[async_trait]
impl ControllerTransport for MockTransport {
    async fn list_endpoints(&self, allowed_types: &[String]) -> SyncResult<ServiceMap> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.listing.lock() {
            None => Ok(ServiceMap::new()),
            Some(Ok(response)) => Ok(response.configured_services(allowed_types)),
            Some(Err(e)) => Err(e.clone()),
        }
    }

    async fn fetch_credential(&self, endpoint: &ServiceEndpoint) -> SyncResult<ServiceCredential> {
        let key = endpoint.key();
        self.credential_requests.lock().push(key.clone());
        self.credentials
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Ok(Self::default_credential(endpoint)))
    }
}
