//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding controller messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The payload could not be decoded.
    #[error("cannot decode {what}: {message}")]
    Decode {
        /// Which message was being decoded.
        what: &'static str,
        /// Decoder message.
        message: String,
    },

    /// The message could not be encoded.
    #[error("cannot encode {what}: {message}")]
    Encode {
        /// Which message was being encoded.
        what: &'static str,
        /// Encoder message.
        message: String,
    },
}

impl ProtocolError {
    pub(crate) fn decode(what: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            what,
            message: err.to_string(),
        }
    }

    pub(crate) fn encode(what: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            what,
            message: err.to_string(),
        }
    }
}
