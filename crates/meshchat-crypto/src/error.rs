//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors produced by key handling, sealing, and opening.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Public key block is malformed or does not hold valid key points.
    #[error("invalid key format: {reason}")]
    InvalidKeyFormat {
        /// What was wrong with the block
        reason: String,
    },

    /// Keypair could not be produced from the supplied entropy.
    #[error("key generation failed: {reason}")]
    KeyGeneration {
        /// Why generation failed
        reason: String,
    },

    /// Sealing requires at least one recipient.
    #[error("no recipients")]
    NoRecipients,

    /// AEAD or key derivation failed while sealing.
    #[error("encryption failed: {reason}")]
    EncryptionFailed {
        /// Failure detail
        reason: String,
    },

    /// Authentication failed or the content key could not be unwrapped.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Failure detail
        reason: String,
    },

    /// The sealed message holds no wrapped key for this keypair.
    #[error("message is not addressed to this key")]
    NotARecipient,

    /// The sealed bytes are not a sealed message.
    #[error("malformed sealed message: {reason}")]
    Malformed {
        /// Decoding failure detail
        reason: String,
    },
}
