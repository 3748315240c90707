//! # ctlsync Protocol
//!
//! Wire types for talking to the controller, plus the change events the
//! sync engine publishes downstream.
//!
//! This crate provides:
//! - Controller messages (agent statistics, service credentials)
//! - `ServiceKey`, `ServiceEndpoint` and `ServiceCredential`
//! - `ChangeEvent` for add/update/delete notifications
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod error;
mod messages;
mod service;

pub use change_feed::{ChangeEvent, Operation};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    decode_agent_statistics, decode_service_credentials, encode_credentials_request, AgentEndpoint,
    AgentStatisticsResponse, ConnectedAgent, Credential, ServiceCredentialsRequest,
    ServiceCredentialsResponse, AGENT_STATISTICS_PATH, GENERATE_CREDENTIALS_PATH,
};
pub use service::{ServiceCredential, ServiceEndpoint, ServiceKey, ServiceMap};
