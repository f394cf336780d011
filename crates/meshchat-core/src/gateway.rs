//! Encryption Gateway.
//!
//! Thin adapter between the session and the crypto collaborator. Outbound
//! payloads are sealed for every key in the [`KeyStore`] and signed with the
//! own keypair; inbound payloads are opened with the own keypair and verified
//! against the sender's imported key when one is held.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use meshchat_crypto::{SEAL_SEED_SIZE, open, seal};
use meshchat_proto::PeerId;

use crate::{error::SessionError, key_store::KeyStore};

/// Decrypted inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    /// Recovered content.
    pub plaintext: Vec<u8>,
    /// Signature verified against the sender's imported key.
    pub verified: bool,
}

/// Borrowing view over the key store for sealing and opening.
#[derive(Debug, Clone, Copy)]
pub struct EncryptionGateway<'a> {
    keys: &'a KeyStore,
}

impl<'a> EncryptionGateway<'a> {
    /// Wrap a key store.
    pub fn new(keys: &'a KeyStore) -> Self {
        Self { keys }
    }

    /// Seal `plaintext` for every known peer key and return it base64 encoded.
    ///
    /// # Errors
    ///
    /// - `SessionError::EncryptionFailed` if no peer keys are held, no own
    ///   keypair exists, or sealing fails
    pub fn encrypt_for_all_peers(
        &self,
        plaintext: &[u8],
        seed: [u8; SEAL_SEED_SIZE],
    ) -> Result<String, SessionError> {
        let signer = self.keys.keypair().ok_or_else(|| SessionError::EncryptionFailed {
            reason: "no session keypair".to_string(),
        })?;

        let recipients: Vec<_> = self.keys.peer_keys().copied().collect();
        let sealed = seal(plaintext, &recipients, signer, seed)?;
        Ok(BASE64.encode(sealed))
    }

    /// Open a base64 sealed payload attributed to `sender`.
    ///
    /// A failed signature check is not an error: the plaintext is returned
    /// with `verified == false`.
    ///
    /// # Errors
    ///
    /// - `SessionError::DecryptionFailed` if the payload is not base64, not
    ///   addressed to us, or fails authentication
    pub fn decrypt_from_peer(
        &self,
        ciphertext: &str,
        sender: &PeerId,
    ) -> Result<Decrypted, SessionError> {
        let own = self.keys.keypair().ok_or_else(|| SessionError::DecryptionFailed {
            reason: "no session keypair".to_string(),
        })?;

        let sealed = BASE64.decode(ciphertext.as_bytes()).map_err(|e| {
            SessionError::DecryptionFailed { reason: format!("ciphertext is not base64: {e}") }
        })?;

        let sender_key = self.keys.peer_key(sender);
        if sender_key.is_none() {
            tracing::debug!(%sender, "no key held for sender, skipping verification");
        }

        let opened = open(&sealed, own, sender_key)?;
        Ok(Decrypted { plaintext: opened.plaintext, verified: opened.signature_valid })
    }
}
