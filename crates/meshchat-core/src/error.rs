//! Error types for the session core.
//!
//! [`JoinError`] covers the only operation with a deadline. [`SessionError`]
//! is the full taxonomy: a few variants end the session, the rest are local to
//! one handshake or one message and are reported without changing state.

use std::time::Duration;

use meshchat_crypto::CryptoError;
use meshchat_proto::ProtocolError;
use thiserror::Error;

use crate::session::SessionState;

/// Ways a join attempt can fail. A join never resolves without a completed
/// `key_exchange` from the creator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// Creator is not registered, or entry is closed.
    #[error("channel inactive: the creator is unreachable or entry is closed")]
    PeerUnavailable,

    /// Handshake did not complete within the deadline.
    #[error("join timed out after {elapsed:?}")]
    RequestTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Any other transport failure during the join.
    #[error("network error: {reason}")]
    Network {
        /// Failure detail from the transport
        reason: String,
    },
}

/// Errors produced by the session core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Rendezvous registration was refused.
    #[error("registration failed: {reason}")]
    RegistrationFailure {
        /// Reason reported by the rendezvous collaborator
        reason: String,
    },

    /// Join attempt failed.
    #[error(transparent)]
    Join(#[from] JoinError),

    /// Own keypair could not be generated.
    #[error("key generation failed: {reason}")]
    KeyGeneration {
        /// Failure detail
        reason: String,
    },

    /// Handshake carried a malformed public key block.
    #[error("invalid key format: {reason}")]
    InvalidKeyFormat {
        /// What was wrong with the block
        reason: String,
    },

    /// Handshake carried an empty or oversized codename.
    #[error("invalid codename: {reason}")]
    InvalidCodename {
        /// Which rule was violated
        reason: String,
    },

    /// Outbound message could not be encrypted.
    #[error("encryption failed: {reason}")]
    EncryptionFailed {
        /// Failure detail
        reason: String,
    },

    /// Inbound payload could not be decrypted.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Failure detail
        reason: String,
    },

    /// File payload failed validation.
    #[error("file rejected: {reason}")]
    FileRejected {
        /// First violated rule
        reason: String,
    },

    /// Intent not valid in the current state.
    #[error("invalid state: cannot {operation} while {state}")]
    InvalidState {
        /// State when the intent arrived
        state: SessionState,
        /// Intent that was attempted
        operation: String,
    },
}

impl SessionError {
    /// Returns true if this error ends the session.
    ///
    /// Handshake and per-message failures are local: the offending exchange
    /// or message is reported and the session carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RegistrationFailure { .. } | Self::Join(_) | Self::KeyGeneration { .. }
        )
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidCodename { reason } => Self::InvalidCodename { reason },
            ProtocolError::FileRejected { reason } => Self::FileRejected { reason },
            ProtocolError::Encode(reason) => Self::EncryptionFailed { reason },
            ProtocolError::Decode(reason) => Self::DecryptionFailed { reason },
            ProtocolError::InvalidChannelId { reason } => Self::InvalidState {
                state: SessionState::Landing,
                operation: format!("use channel identifier ({reason})"),
            },
        }
    }
}

impl From<CryptoError> for SessionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKeyFormat { reason } => Self::InvalidKeyFormat { reason },
            CryptoError::KeyGeneration { reason } => Self::KeyGeneration { reason },
            CryptoError::NoRecipients => {
                Self::EncryptionFailed { reason: "no recipients".to_string() }
            },
            CryptoError::EncryptionFailed { reason } => Self::EncryptionFailed { reason },
            CryptoError::DecryptionFailed { reason } | CryptoError::Malformed { reason } => {
                Self::DecryptionFailed { reason }
            },
            CryptoError::NotARecipient => Self::DecryptionFailed {
                reason: "message is not addressed to this session".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(SessionError::RegistrationFailure { reason: "taken".into() }.is_fatal());
        assert!(SessionError::Join(JoinError::PeerUnavailable).is_fatal());
        assert!(!SessionError::DecryptionFailed { reason: "x".into() }.is_fatal());
        assert!(!SessionError::FileRejected { reason: "x".into() }.is_fatal());
        assert!(!SessionError::InvalidCodename { reason: "x".into() }.is_fatal());
    }

    #[test]
    fn timeout_and_unavailable_render_distinctly() {
        let timeout = JoinError::RequestTimeout { elapsed: Duration::from_secs(20) };
        assert_ne!(timeout.to_string(), JoinError::PeerUnavailable.to_string());
        assert!(JoinError::PeerUnavailable.to_string().contains("inactive"));
    }

    #[test]
    fn crypto_errors_map_to_taxonomy() {
        assert!(matches!(
            SessionError::from(CryptoError::NoRecipients),
            SessionError::EncryptionFailed { .. }
        ));
        assert!(matches!(
            SessionError::from(CryptoError::NotARecipient),
            SessionError::DecryptionFailed { .. }
        ));
    }
}
