//! # ctlsync Engine
//!
//! Keeps a local view of the services exposed by agents behind a controller
//! and publishes incremental change events for a downstream consumer.
//!
//! This crate provides:
//! - Configuration with per-instance defaults
//! - Controller transport abstraction, with a mutual-TLS HTTP implementation
//! - Reconciliation of the known service table (poll, diff, publish)
//! - A bounded event queue with blocking hand-off
//! - Lifecycle management of the background worker and a health check
//!
//! ## Architecture
//!
//! Each reconcile tick:
//! 1. Lists configured endpoints of allow-listed types from the controller
//! 2. Exchanges credentials for services seen for the first time
//! 3. Emits `update` events for new services and changed annotations
//! 4. Emits `delete` events for services no longer listed
//!
//! ## Key Invariants
//!
//! - The controller is authoritative
//! - Credentials are fetched exactly once per discovered service
//! - A tick runs to completion before the next one is scheduled
//! - Remote failures never stop the engine; they show up in the health check

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod manager;
mod queue;
mod state;
mod transport;

pub use config::{
    HttpClientConfig, SyncConfig, DEFAULT_CA_PATH, DEFAULT_CERTIFICATE_PATH, DEFAULT_KEY_PATH,
    DEFAULT_UPDATE_FREQUENCY_SECONDS,
};
pub use error::{SyncError, SyncResult};
pub use http::{build_tls_client, HttpTransport};
pub use manager::ControllerManager;
pub use queue::{event_queue, EventReceiver, EventSender, EVENT_QUEUE_CAPACITY};
pub use state::{CycleSummary, Reconciler, ServiceRecord, SyncMonitor, SyncStats};
pub use transport::{ControllerTransport, MockTransport};
