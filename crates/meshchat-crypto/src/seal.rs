//! Multi-recipient sealing with sender signatures.
//!
//! All functions are pure - random bytes must be provided by the caller.
//! A single 32-byte seed expands (via HKDF) into every secret a seal needs, so
//! the same seed always produces the same sealed bytes.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use ed25519_dalek::{Signature, VerifyingKey};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{
    error::CryptoError,
    keys::{Keypair, PublicKeyBundle},
};

/// Entropy consumed by one call to [`seal`].
pub const SEAL_SEED_SIZE: usize = 32;

/// Sealed message format version.
const SEAL_VERSION: u8 = 1;

const SEED_SALT: &[u8] = b"meshchatSealV1";
const CONTENT_KEY_LABEL: &[u8] = b"content-key";
const CONTENT_NONCE_LABEL: &[u8] = b"content-nonce";
const EPHEMERAL_LABEL: &[u8] = b"ephemeral";
const WRAP_NONCE_LABEL: &[u8] = b"wrap-nonce";
const WRAP_KEY_LABEL: &[u8] = b"meshchatWrapV1";

/// Content key wrapped for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WrappedKey {
    recipient: [u8; 32],
    ephemeral: [u8; 32],
    nonce: [u8; 24],
    wrapped: Vec<u8>,
}

/// Signed portion of a sealed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedBody {
    version: u8,
    nonce: [u8; 24],
    recipients: Vec<WrappedKey>,
    ciphertext: Vec<u8>,
}

/// Outer envelope: encoded body plus detached signature over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedMessage {
    body: Vec<u8>,
    signature: Vec<u8>,
}

/// Result of opening a sealed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    /// Decrypted content.
    pub plaintext: Vec<u8>,
    /// Whether the signature verified against the expected sender's key.
    ///
    /// `false` when no sender key was supplied or verification failed.
    pub signature_valid: bool,
}

/// Encrypt `plaintext` for every recipient and sign it with `signer`.
///
/// # Security
///
/// - Fresh content key and nonce per call (derived from `seed`)
/// - Each recipient's wrap uses its own ephemeral X25519 secret
/// - Caller MUST provide cryptographically secure random bytes in production
///
/// # Errors
///
/// - `CryptoError::NoRecipients` if `recipients` is empty
/// - `CryptoError::EncryptionFailed` if the AEAD or encoding fails
pub fn seal(
    plaintext: &[u8],
    recipients: &[PublicKeyBundle],
    signer: &Keypair,
    seed: [u8; SEAL_SEED_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    if recipients.is_empty() {
        return Err(CryptoError::NoRecipients);
    }

    let seed = Zeroizing::new(seed);
    let hkdf = Hkdf::<Sha256>::new(Some(SEED_SALT), seed.as_slice());

    let mut content_key = Zeroizing::new([0u8; 32]);
    expand(&hkdf, CONTENT_KEY_LABEL, None, content_key.as_mut_slice())?;
    let mut nonce = [0u8; 24];
    expand(&hkdf, CONTENT_NONCE_LABEL, None, &mut nonce)?;

    let ciphertext = aead_encrypt(&content_key, &nonce, plaintext)?;

    let mut wrapped_keys = Vec::with_capacity(recipients.len());
    for (index, recipient) in recipients.iter().enumerate() {
        let index = index as u32;

        let mut ephemeral_bytes = Zeroizing::new([0u8; 32]);
        expand(&hkdf, EPHEMERAL_LABEL, Some(index), ephemeral_bytes.as_mut_slice())?;
        let ephemeral = StaticSecret::from(*ephemeral_bytes);
        let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();

        let mut wrap_nonce = [0u8; 24];
        expand(&hkdf, WRAP_NONCE_LABEL, Some(index), &mut wrap_nonce)?;

        let shared = ephemeral.diffie_hellman(&PublicKey::from(recipient.encryption));
        let wrap_key = derive_wrap_key(shared.as_bytes(), &ephemeral_public, &recipient.encryption)
            .map_err(|reason| CryptoError::EncryptionFailed { reason })?;

        wrapped_keys.push(WrappedKey {
            recipient: recipient.encryption,
            ephemeral: ephemeral_public,
            nonce: wrap_nonce,
            wrapped: aead_encrypt(&wrap_key, &wrap_nonce, content_key.as_slice())?,
        });
    }

    let body = SealedBody { version: SEAL_VERSION, nonce, recipients: wrapped_keys, ciphertext };
    let body = to_cbor(&body)?;
    let signature = signer.sign(&body).to_bytes().to_vec();

    to_cbor(&SealedMessage { body, signature })
}

/// Decrypt a sealed message addressed to `own`.
///
/// Signature verification runs independently of decryption. When `sender` is
/// `None` or the signature does not verify, the plaintext is still returned
/// with `signature_valid == false`.
///
/// # Errors
///
/// - `CryptoError::Malformed` if the bytes are not a sealed message
/// - `CryptoError::NotARecipient` if no key was wrapped for `own`
/// - `CryptoError::DecryptionFailed` if authentication fails
pub fn open(
    sealed: &[u8],
    own: &Keypair,
    sender: Option<&PublicKeyBundle>,
) -> Result<Opened, CryptoError> {
    let envelope: SealedMessage = from_cbor(sealed)?;
    let body: SealedBody = from_cbor(&envelope.body)?;

    if body.version != SEAL_VERSION {
        return Err(CryptoError::Malformed {
            reason: format!("unsupported seal version {}", body.version),
        });
    }

    let own_public = own.public();
    let entry = body
        .recipients
        .iter()
        .find(|entry| entry.recipient == own_public.encryption)
        .ok_or(CryptoError::NotARecipient)?;

    let shared = own.diffie_hellman(&entry.ephemeral);
    let wrap_key = derive_wrap_key(shared.as_bytes(), &entry.ephemeral, &own_public.encryption)
        .map_err(|reason| CryptoError::DecryptionFailed { reason })?;

    let content_key = Zeroizing::new(aead_decrypt(&wrap_key, &entry.nonce, &entry.wrapped)?);
    if content_key.len() != 32 {
        return Err(CryptoError::DecryptionFailed {
            reason: format!("unwrapped key is {} bytes", content_key.len()),
        });
    }
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&content_key);

    let plaintext = aead_decrypt(&key, &body.nonce, &body.ciphertext)?;
    let signature_valid =
        sender.is_some_and(|sender| verify(&envelope.body, &envelope.signature, sender));

    Ok(Opened { plaintext, signature_valid })
}

fn verify(body: &[u8], signature: &[u8], sender: &PublicKeyBundle) -> bool {
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&sender.verifying) else {
        return false;
    };
    key.verify_strict(body, &signature).is_ok()
}

fn expand(
    hkdf: &Hkdf<Sha256>,
    label: &[u8],
    index: Option<u32>,
    out: &mut [u8],
) -> Result<(), CryptoError> {
    let mut info = Vec::with_capacity(label.len() + 4);
    info.extend_from_slice(label);
    if let Some(index) = index {
        info.extend_from_slice(&index.to_be_bytes());
    }

    hkdf.expand(&info, out).map_err(|e| CryptoError::EncryptionFailed { reason: e.to_string() })
}

/// Wrap key = HKDF(shared secret, label || ephemeral public || recipient public).
fn derive_wrap_key(
    shared: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>, String> {
    let hkdf = Hkdf::<Sha256>::new(None, shared);

    let mut info = Vec::with_capacity(WRAP_KEY_LABEL.len() + 64);
    info.extend_from_slice(WRAP_KEY_LABEL);
    info.extend_from_slice(ephemeral_public);
    info.extend_from_slice(recipient_public);

    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(&info, key.as_mut_slice()).map_err(|e| e.to_string())?;
    Ok(key)
}

fn aead_encrypt(
    key: &[u8; 32],
    nonce: &[u8; 24],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::EncryptionFailed { reason: e.to_string() })?;

    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed { reason: "AEAD encryption failed".to_string() })
}

fn aead_decrypt(
    key: &[u8; 32],
    nonce: &[u8; 24],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::DecryptionFailed { reason: e.to_string() })?;

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed { reason: "authentication failed".to_string() })
}

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, CryptoError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| CryptoError::EncryptionFailed { reason: e.to_string() })?;
    Ok(buf)
}

fn from_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CryptoError> {
    ciborium::de::from_reader(bytes).map_err(|e| CryptoError::Malformed { reason: e.to_string() })
}
