//! Error types for the wire protocol.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding, decoding, or validating wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// CBOR encoding failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// CBOR decoding failed (malformed bytes or missing fields).
    #[error("decode failed: {0}")]
    Decode(String),

    /// Channel identifier is neither a word code nor a legacy token.
    #[error("invalid channel id: {reason}")]
    InvalidChannelId {
        /// Why the identifier was rejected
        reason: String,
    },

    /// Codename is empty or too long.
    #[error("invalid codename: {reason}")]
    InvalidCodename {
        /// Why the codename was rejected
        reason: String,
    },

    /// A `file` payload failed validation.
    #[error("file rejected: {reason}")]
    FileRejected {
        /// Human-readable rejection reason, suitable for display
        reason: String,
    },
}

impl ProtocolError {
    pub(crate) fn file_rejected(reason: impl Into<String>) -> Self {
        Self::FileRejected { reason: reason.into() }
    }
}
