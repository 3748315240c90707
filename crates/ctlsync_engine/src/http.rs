//! HTTP transport implementation.
//!
//! Talks JSON to the controller over HTTPS, presenting the configured client
//! certificate and trusting only the configured CA bundle.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::ControllerTransport;
use async_trait::async_trait;
use ctlsync_protocol::{
    decode_agent_statistics, decode_service_credentials, encode_credentials_request,
    ServiceCredential, ServiceCredentialsRequest, ServiceEndpoint, ServiceMap,
    AGENT_STATISTICS_PATH, GENERATE_CREDENTIALS_PATH,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

/// Controller transport over mutual-TLS HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport from configuration.
    ///
    /// Defaults are applied to a copy of `config` first. The TLS material is
    /// read once, here.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the URL is unusable or the CA
    /// bundle, certificate or key cannot be loaded.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let config = config.clone().with_defaults();
        let base_url = config.controller_url()?;
        let client = build_tls_client(&config)?;
        Ok(Self { base_url, client })
    }

    /// Creates a transport around an already configured client.
    pub fn with_client(base_url: Url, client: reqwest::Client) -> Self {
        Self { base_url, client }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends a resource path to the base URL's path.
    pub fn resource_url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }
}

/// Builds an HTTP client that presents the configured client certificate
/// and trusts only the configured CA bundle.
///
/// # Errors
///
/// Returns [`SyncError::Configuration`] when any of the files cannot be read
/// or parsed, or the client cannot be built.
pub fn build_tls_client(config: &SyncConfig) -> SyncResult<reqwest::Client> {
    let ca = std::fs::read(&config.ca_path).map_err(|e| {
        SyncError::Configuration(format!(
            "loading certificate authority {}: {}",
            config.ca_path.display(),
            e
        ))
    })?;
    let roots = reqwest::Certificate::from_pem_bundle(&ca).map_err(|e| {
        SyncError::Configuration(format!(
            "parsing certificate authority {}: {}",
            config.ca_path.display(),
            e
        ))
    })?;
    if roots.is_empty() {
        return Err(SyncError::Configuration(format!(
            "no certificates found in {}",
            config.ca_path.display()
        )));
    }

    let mut identity_pem = std::fs::read(&config.certificate_path).map_err(|e| {
        SyncError::Configuration(format!(
            "loading certificate {}: {}",
            config.certificate_path.display(),
            e
        ))
    })?;
    let key = std::fs::read(&config.key_path).map_err(|e| {
        SyncError::Configuration(format!("loading key {}: {}", config.key_path.display(), e))
    })?;
    identity_pem.push(b'\n');
    identity_pem.extend_from_slice(&key);
    let identity = reqwest::Identity::from_pem(&identity_pem)
        .map_err(|e| SyncError::Configuration(format!("loading certificate and key: {e}")))?;

    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .tls_built_in_root_certs(false)
        .identity(identity)
        .connect_timeout(config.http.connect_timeout())
        .timeout(config.http.request_timeout())
        .pool_max_idle_per_host(config.http.max_idle_connections);
    for root in roots {
        builder = builder.add_root_certificate(root);
    }
    builder
        .build()
        .map_err(|e| SyncError::Configuration(format!("making TLS client: {e}")))
}

async fn read_body(response: reqwest::Response, context: &str) -> SyncResult<Vec<u8>> {
    let status = response.status();
    if status != StatusCode::OK {
        return Err(SyncError::remote_status(context, status.as_u16()));
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| SyncError::remote(format!("{context}: reading body: {e}")))?;
    Ok(body.to_vec())
}

#[async_trait]
impl ControllerTransport for HttpTransport {
    async fn list_endpoints(&self, allowed_types: &[String]) -> SyncResult<ServiceMap> {
        let url = self.resource_url(AGENT_STATISTICS_PATH);
        debug!(%url, "fetching connected agents");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::remote(format!("fetching connected agents: {e}")))?;
        let body = read_body(response, "fetching connected agents").await?;

        let statistics = decode_agent_statistics(&body)?;
        Ok(statistics.configured_services(allowed_types))
    }

    async fn fetch_credential(&self, endpoint: &ServiceEndpoint) -> SyncResult<ServiceCredential> {
        let url = self.resource_url(GENERATE_CREDENTIALS_PATH);
        let request = ServiceCredentialsRequest::for_endpoint(endpoint);
        debug!(%url, service = %request.key(), "fetching service credentials");

        let payload = encode_credentials_request(&request)?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| SyncError::remote(format!("fetching service credentials: {e}")))?;
        let body = read_body(response, "fetching service credentials").await?;

        Ok(decode_service_credentials(&body)?.into())
    }
}
