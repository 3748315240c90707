//! Error types for the sync engine.

use ctlsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Cloneable so the last failure can be handed to any health reader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Unusable configuration or TLS material.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The controller could not be reached or answered with a failure.
    #[error("remote error: {message}")]
    Remote {
        /// Error message.
        message: String,
        /// HTTP status, when the controller answered at all.
        status: Option<u16>,
    },

    /// The controller answered with a body that could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// No reconcile has completed yet.
    #[error("controller is not yet synced")]
    NotYetSynced,
}

impl SyncError {
    /// Creates a remote error for a failed transport.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            status: None,
        }
    }

    /// Creates a remote error for an unexpected HTTP status.
    pub fn remote_status(context: &str, status: u16) -> Self {
        Self::Remote {
            message: format!("{context}: http status {status}"),
            status: Some(status),
        }
    }

    /// Returns true if the next poll may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Remote { .. } | SyncError::Decode(_))
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Decode { .. } => SyncError::Decode(err.to_string()),
            ProtocolError::Encode { .. } => SyncError::Remote {
                message: err.to_string(),
                status: None,
            },
        }
    }
}
