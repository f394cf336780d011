//! Session keypairs and armored public keys.
//!
//! A [`Keypair`] bundles an X25519 encryption secret with an Ed25519 signing
//! key. Its public half travels over the wire as an armored text block:
//!
//! ```text
//! -----BEGIN MESHCHAT PUBLIC KEY-----
//! <base64 of encryption key || verifying key>
//! -----END MESHCHAT PUBLIC KEY-----
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};

use crate::error::CryptoError;

/// Entropy consumed by [`Keypair::generate`].
pub const KEYPAIR_SEED_SIZE: usize = 64;

const ARMOR_HEADER: &str = "-----BEGIN MESHCHAT PUBLIC KEY-----";
const ARMOR_FOOTER: &str = "-----END MESHCHAT PUBLIC KEY-----";

/// Size of the raw public bundle (encryption key + verifying key).
const BUNDLE_SIZE: usize = 64;

/// Bytes of the SHA-256 digest shown in a fingerprint.
const FINGERPRINT_BYTES: usize = 16;

/// Secret keypair for one session.
///
/// Both secret halves zeroize themselves on drop.
pub struct Keypair {
    encryption: StaticSecret,
    signing: SigningKey,
}

impl Keypair {
    /// Derive a keypair from caller-supplied entropy.
    ///
    /// # Errors
    ///
    /// - `CryptoError::KeyGeneration` if the entropy is all zeros (a broken
    ///   RNG, never a legitimate draw)
    pub fn generate(seed: &[u8; KEYPAIR_SEED_SIZE]) -> Result<Self, CryptoError> {
        if seed.iter().all(|&b| b == 0) {
            return Err(CryptoError::KeyGeneration {
                reason: "entropy source returned all zeros".to_string(),
            });
        }

        let mut encryption_bytes = [0u8; 32];
        let mut signing_bytes = [0u8; 32];
        encryption_bytes.copy_from_slice(&seed[..32]);
        signing_bytes.copy_from_slice(&seed[32..]);

        let keypair = Self {
            encryption: StaticSecret::from(encryption_bytes),
            signing: SigningKey::from_bytes(&signing_bytes),
        };

        zeroize::Zeroize::zeroize(&mut encryption_bytes);
        zeroize::Zeroize::zeroize(&mut signing_bytes);

        Ok(keypair)
    }

    /// Public half of this keypair.
    pub fn public(&self) -> PublicKeyBundle {
        PublicKeyBundle {
            encryption: PublicKey::from(&self.encryption).to_bytes(),
            verifying: self.signing.verifying_key().to_bytes(),
        }
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }

    pub(crate) fn diffie_hellman(&self, their_public: &[u8; 32]) -> SharedSecret {
        self.encryption.diffie_hellman(&PublicKey::from(*their_public))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair").field("fingerprint", &fingerprint(&self.public())).finish()
    }
}

/// Public encryption and verification keys of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKeyBundle {
    /// X25519 public key used to wrap content keys for this participant.
    pub encryption: [u8; 32],
    /// Ed25519 key used to verify this participant's signatures.
    pub verifying: [u8; 32],
}

impl PublicKeyBundle {
    /// Armored text form for the wire.
    pub fn armor(&self) -> String {
        let mut raw = [0u8; BUNDLE_SIZE];
        raw[..32].copy_from_slice(&self.encryption);
        raw[32..].copy_from_slice(&self.verifying);
        format!("{ARMOR_HEADER}\n{}\n{ARMOR_FOOTER}", BASE64.encode(raw))
    }

    /// Parse an armored block.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidKeyFormat` if the block shape, base64, length,
    ///   or verifying key point is invalid
    pub fn from_armored(block: &str) -> Result<Self, CryptoError> {
        let body = block
            .trim()
            .strip_prefix(ARMOR_HEADER)
            .and_then(|rest| rest.strip_suffix(ARMOR_FOOTER))
            .ok_or_else(|| invalid_key("missing armor header or footer"))?;

        let encoded: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        let raw = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| invalid_key(format!("armor body is not base64: {e}")))?;

        if raw.len() != BUNDLE_SIZE {
            return Err(invalid_key(format!(
                "expected {BUNDLE_SIZE} key bytes, found {}",
                raw.len()
            )));
        }

        let mut encryption = [0u8; 32];
        let mut verifying = [0u8; 32];
        encryption.copy_from_slice(&raw[..32]);
        verifying.copy_from_slice(&raw[32..]);

        VerifyingKey::from_bytes(&verifying)
            .map_err(|_| invalid_key("verifying key is not a valid curve point"))?;

        Ok(Self { encryption, verifying })
    }
}

/// Cheap shape check on an armored block: header and footer present.
///
/// Used to reject obviously malformed handshake envelopes before attempting a
/// full import.
pub fn is_armored_public_key(block: &str) -> bool {
    let block = block.trim();
    block.starts_with(ARMOR_HEADER) && block.ends_with(ARMOR_FOOTER)
}

/// Short, human-comparable hash of a public key bundle.
///
/// Eight groups of four uppercase hex digits (first 16 bytes of SHA-256).
pub fn fingerprint(bundle: &PublicKeyBundle) -> String {
    let digest =
        Sha256::new().chain_update(bundle.encryption).chain_update(bundle.verifying).finalize();

    digest[..FINGERPRINT_BYTES]
        .chunks(2)
        .map(|pair| format!("{:02X}{:02X}", pair[0], pair[1]))
        .collect::<Vec<_>>()
        .join(" ")
}

fn invalid_key(reason: impl Into<String>) -> CryptoError {
    CryptoError::InvalidKeyFormat { reason: reason.into() }
}
