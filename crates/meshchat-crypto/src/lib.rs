//! Meshchat Cryptographic Primitives
//!
//! The asymmetric crypto collaborator used by the session core: keypair
//! generation, public-key armoring and fingerprints, and multi-recipient
//! sealing with sender signatures. Pure functions with deterministic outputs.
//! Callers provide random bytes for deterministic testing.
//!
//! # Sealing
//!
//! ```text
//! seed ──HKDF──> content key, content nonce, per-recipient ephemeral keys
//!                    │
//!   plaintext ──XChaCha20-Poly1305──> ciphertext
//!                    │
//!   content key ──X25519(ephemeral, recipient) + HKDF──> wrapped key (per recipient)
//!                    │
//!   body = { nonce, recipients, ciphertext } ──Ed25519(sender)──> signature
//! ```
//!
//! # Security
//!
//! - One keypair per session, held only in memory. Secret halves are zeroized
//!   on drop.
//! - Every recipient gets the content key wrapped under a fresh ephemeral
//!   X25519 exchange.
//! - Decryption and signature verification are independent: a message whose
//!   signature does not verify still decrypts, and the caller decides how to
//!   surface that.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod keys;
mod seal;

pub use error::CryptoError;
pub use keys::{KEYPAIR_SEED_SIZE, Keypair, PublicKeyBundle, fingerprint, is_armored_public_key};
pub use seal::{Opened, SEAL_SEED_SIZE, open, seal};
