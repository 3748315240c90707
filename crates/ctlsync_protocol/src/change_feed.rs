//! Change events published for downstream consumers.

use crate::service::{ServiceCredential, ServiceEndpoint, ServiceKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Service was added or its annotations changed.
    Update,
    /// Service is no longer reported by the controller.
    Delete,
}

impl Operation {
    /// Returns the wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// A single change to the set of known services.
///
/// `update` events carry the full current state of the service, including
/// its URL and token. `delete` events only identify the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Type of change.
    pub operation: Operation,
    /// Service name.
    pub name: String,
    /// Service type.
    #[serde(rename = "type")]
    pub service_type: String,
    /// Agent exposing the service.
    pub agent_name: String,
    /// Annotations (empty for deletes).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
    /// Service URL (empty for deletes).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Service token (empty for deletes).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

impl ChangeEvent {
    /// Creates an update event from the current state of a service.
    pub fn update(endpoint: &ServiceEndpoint, credential: &ServiceCredential) -> Self {
        Self {
            operation: Operation::Update,
            name: endpoint.name.clone(),
            service_type: endpoint.service_type.clone(),
            agent_name: endpoint.agent_name.clone(),
            annotations: endpoint.annotations.clone(),
            url: credential.url.clone(),
            token: credential.token.clone(),
        }
    }

    /// Creates a delete event for a service.
    pub fn delete(endpoint: &ServiceEndpoint) -> Self {
        Self {
            operation: Operation::Delete,
            name: endpoint.name.clone(),
            service_type: endpoint.service_type.clone(),
            agent_name: endpoint.agent_name.clone(),
            annotations: HashMap::new(),
            url: String::new(),
            token: String::new(),
        }
    }

    /// Returns the identity of the service this event is about.
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.agent_name, &self.name, &self.service_type)
    }

    /// Returns true for update events.
    pub fn is_update(&self) -> bool {
        self.operation == Operation::Update
    }

    /// Returns true for delete events.
    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> ServiceEndpoint {
        ServiceEndpoint::new("agent-1", "argo", "argocd").with_annotation("team", "a")
    }

    #[test]
    fn update_event_carries_credential() {
        let event = ChangeEvent::update(&endpoint(), &ServiceCredential::new("https://x", "tok"));
        assert!(event.is_update());
        assert_eq!(event.url, "https://x");
        assert_eq!(event.token, "tok");
        assert_eq!(event.annotations.len(), 1);
        assert_eq!(event.key(), endpoint().key());
    }

    #[test]
    fn delete_event_is_bare() {
        let event = ChangeEvent::delete(&endpoint());
        assert!(event.is_delete());
        assert!(event.annotations.is_empty());
        assert!(event.url.is_empty());
        assert!(event.token.is_empty());
        assert_eq!(event.agent_name, "agent-1");
    }

    #[test]
    fn update_json_shape() {
        let event = ChangeEvent::update(&endpoint(), &ServiceCredential::new("https://x", "tok"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "operation": "update",
                "name": "argo",
                "type": "argocd",
                "agentName": "agent-1",
                "annotations": {"team": "a"},
                "url": "https://x",
                "token": "tok"
            })
        );
    }

    #[test]
    fn delete_json_omits_credential() {
        let value = serde_json::to_value(ChangeEvent::delete(&endpoint())).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "operation": "delete",
                "name": "argo",
                "type": "argocd",
                "agentName": "agent-1"
            })
        );
    }

    #[test]
    fn operation_tags() {
        assert_eq!(Operation::Update.as_str(), "update");
        assert_eq!(Operation::Delete.as_str(), "delete");
    }
}
