//! Configuration for the sync engine.
//!
//! Every instance carries its own configuration; defaults are applied to the
//! value handed to the engine, never to process-wide state.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default path of the controller CA bundle.
pub const DEFAULT_CA_PATH: &str = "/app/secrets/controller-ca.crt";
/// Default path of the client certificate.
pub const DEFAULT_CERTIFICATE_PATH: &str = "/app/secrets/controller-control/tls.crt";
/// Default path of the client key.
pub const DEFAULT_KEY_PATH: &str = "/app/secrets/controller-control/tls.key";
/// Default poll interval, in seconds.
pub const DEFAULT_UPDATE_FREQUENCY_SECONDS: u64 = 30;

/// Configuration for talking to the controller.
///
/// Empty paths and a zero interval mean "use the default"; see
/// [`SyncConfig::apply_defaults`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Base URL of the controller. Required.
    pub url: String,
    /// CA bundle used to verify the controller.
    pub ca_path: PathBuf,
    /// Client certificate presented to the controller.
    pub certificate_path: PathBuf,
    /// Key for the client certificate.
    pub key_path: PathBuf,
    /// Seconds between polls.
    pub update_frequency_seconds: u64,
    /// HTTP client settings.
    pub http: HttpClientConfig,
}

impl SyncConfig {
    /// Creates a configuration for the given controller URL.
    ///
    /// Everything else is left unset and picks up defaults when the engine
    /// starts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the CA bundle path.
    pub fn with_ca_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_path = path.into();
        self
    }

    /// Sets the client certificate path.
    pub fn with_certificate_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate_path = path.into();
        self
    }

    /// Sets the client key path.
    pub fn with_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = path.into();
        self
    }

    /// Sets the poll interval in seconds.
    pub fn with_update_frequency(mut self, seconds: u64) -> Self {
        self.update_frequency_seconds = seconds;
        self
    }

    /// Sets the HTTP client settings.
    pub fn with_http(mut self, http: HttpClientConfig) -> Self {
        self.http = http;
        self
    }

    /// Fills empty fields with defaults. Fields already set are kept.
    pub fn apply_defaults(&mut self) {
        if self.ca_path.as_os_str().is_empty() {
            self.ca_path = PathBuf::from(DEFAULT_CA_PATH);
        }
        if self.certificate_path.as_os_str().is_empty() {
            self.certificate_path = PathBuf::from(DEFAULT_CERTIFICATE_PATH);
        }
        if self.key_path.as_os_str().is_empty() {
            self.key_path = PathBuf::from(DEFAULT_KEY_PATH);
        }
        if self.update_frequency_seconds == 0 {
            self.update_frequency_seconds = DEFAULT_UPDATE_FREQUENCY_SECONDS;
        }
        self.http.apply_defaults();
    }

    /// Returns a copy with defaults applied.
    pub fn with_defaults(mut self) -> Self {
        self.apply_defaults();
        self
    }

    /// Returns the poll interval.
    pub fn poll_interval(&self) -> Duration {
        let seconds = match self.update_frequency_seconds {
            0 => DEFAULT_UPDATE_FREQUENCY_SECONDS,
            s => s,
        };
        Duration::from_secs(seconds)
    }

    /// Parses the controller URL.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the URL is empty, cannot be
    /// parsed, or cannot have paths appended to it.
    pub fn controller_url(&self) -> SyncResult<Url> {
        if self.url.trim().is_empty() {
            return Err(SyncError::Configuration("controller URL is not set".into()));
        }
        let url = Url::parse(&self.url).map_err(|e| {
            SyncError::Configuration(format!("invalid controller URL {:?}: {}", self.url, e))
        })?;
        if url.cannot_be_a_base() {
            return Err(SyncError::Configuration(format!(
                "controller URL {:?} cannot be used as a base",
                self.url
            )));
        }
        Ok(url)
    }

    /// Checks that the configuration can be used to reach a controller.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] when the URL is unusable.
    pub fn validate(&self) -> SyncResult<()> {
        self.controller_url().map(|_| ())
    }

    /// Loads a configuration file.
    ///
    /// Files ending in `.yaml` or `.yml` are read as YAML, anything else as
    /// JSON. Defaults are not applied.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the file cannot be read or
    /// parsed.
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Configuration(format!("reading {}: {}", path.display(), e))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let parsed = if is_yaml {
            serde_yaml::from_str(&text).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        };
        parsed.map_err(|e| SyncError::Configuration(format!("parsing {}: {}", path.display(), e)))
    }
}

/// Settings for the HTTP client used to reach the controller.
///
/// All values are in seconds (or a count); zero means "use the default".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpClientConfig {
    /// Timeout for establishing a connection.
    pub connect_timeout_seconds: u64,
    /// Timeout for a whole request, including reading the body.
    pub request_timeout_seconds: u64,
    /// Idle connections kept per host.
    pub max_idle_connections: usize,
}

impl HttpClientConfig {
    /// Default connect timeout.
    pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 15;
    /// Default request timeout.
    pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 60;
    /// Default idle connection count.
    pub const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 5;

    /// Fills zero fields with defaults.
    pub fn apply_defaults(&mut self) {
        if self.connect_timeout_seconds == 0 {
            self.connect_timeout_seconds = Self::DEFAULT_CONNECT_TIMEOUT_SECONDS;
        }
        if self.request_timeout_seconds == 0 {
            self.request_timeout_seconds = Self::DEFAULT_REQUEST_TIMEOUT_SECONDS;
        }
        if self.max_idle_connections == 0 {
            self.max_idle_connections = Self::DEFAULT_MAX_IDLE_CONNECTIONS;
        }
    }

    /// Returns the connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Returns the request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
