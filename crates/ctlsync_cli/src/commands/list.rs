//! List command implementation.

use ctlsync_engine::{ControllerTransport, HttpTransport, SyncConfig};
use ctlsync_protocol::{ServiceEndpoint, ServiceMap};
use serde::Serialize;
use std::collections::BTreeMap;

/// A service as reported by the controller, without credentials.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedService {
    /// Composite identity.
    pub key: String,
    /// Agent exposing the service.
    pub agent_name: String,
    /// Service name.
    pub name: String,
    /// Service type.
    #[serde(rename = "type")]
    pub service_type: String,
    /// Annotations, sorted by key.
    pub annotations: BTreeMap<String, String>,
}

impl From<&ServiceEndpoint> for ListedService {
    fn from(endpoint: &ServiceEndpoint) -> Self {
        Self {
            key: endpoint.key().to_string(),
            agent_name: endpoint.agent_name.clone(),
            name: endpoint.name.clone(),
            service_type: endpoint.service_type.clone(),
            annotations: endpoint
                .annotations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// Runs the list command.
///
/// Performs a single listing; no credentials are requested.
pub async fn run(
    config: &SyncConfig,
    service_types: &[String],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = HttpTransport::from_config(config)?;
    let services = transport.list_endpoints(service_types).await?;
    print!("{}", render(&services, format)?);
    Ok(())
}

fn render(services: &ServiceMap, format: &str) -> Result<String, Box<dyn std::error::Error>> {
    let listed: Vec<ListedService> = services.values().map(ListedService::from).collect();

    match format {
        "json" => Ok(format!("{}\n", serde_json::to_string_pretty(&listed)?)),
        "text" => {
            let mut out = String::new();
            if listed.is_empty() {
                out.push_str("No configured services\n");
            }
            for service in &listed {
                out.push_str(&service.key);
                for (k, v) in &service.annotations {
                    out.push_str(&format!(" {k}={v}"));
                }
                out.push('\n');
            }
            Ok(out)
        }
        other => Err(format!("Unknown format: {other}").into()),
    }
}
