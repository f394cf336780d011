//! Key & Peer-Key Store.
//!
//! Owns this session's keypair and the imported public keys of every remote
//! participant, keyed by peer identifier. Nothing outlives [`KeyStore::purge`]:
//! the keypair zeroizes on drop and peer keys are discarded.

use std::collections::HashMap;

use meshchat_crypto::{KEYPAIR_SEED_SIZE, Keypair, PublicKeyBundle, fingerprint};
use meshchat_proto::PeerId;

use crate::error::SessionError;

/// Own keypair plus imported peer keys.
#[derive(Debug, Default)]
pub struct KeyStore {
    own: Option<Keypair>,
    peers: HashMap<PeerId, PublicKeyBundle>,
}

impl KeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the session keypair and return its armored public key.
    ///
    /// Replaces any previous keypair.
    ///
    /// # Errors
    ///
    /// - `SessionError::KeyGeneration` if the entropy is unusable
    pub fn generate_own_keypair(
        &mut self,
        seed: &[u8; KEYPAIR_SEED_SIZE],
    ) -> Result<String, SessionError> {
        let keypair = Keypair::generate(seed)?;
        let armored = keypair.public().armor();
        self.own = Some(keypair);
        Ok(armored)
    }

    /// Import (or replace) a peer's armored public key.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidKeyFormat` if the block does not parse; any
    ///   previously held key for the peer is kept
    pub fn import_peer_key(&mut self, peer_id: &PeerId, armored: &str) -> Result<(), SessionError> {
        let bundle = PublicKeyBundle::from_armored(armored)?;
        self.peers.insert(peer_id.clone(), bundle);
        Ok(())
    }

    /// Forget a peer's key. Returns whether a key was held.
    pub fn remove_peer_key(&mut self, peer_id: &PeerId) -> bool {
        self.peers.remove(peer_id).is_some()
    }

    /// Whether a key is held for the peer.
    pub fn has_key(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Imported key of a peer.
    pub fn peer_key(&self, peer_id: &PeerId) -> Option<&PublicKeyBundle> {
        self.peers.get(peer_id)
    }

    /// Every imported peer key.
    pub fn peer_keys(&self) -> impl Iterator<Item = &PublicKeyBundle> {
        self.peers.values()
    }

    /// Number of imported peer keys.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Own keypair. `None` before generation or after purge.
    pub fn keypair(&self) -> Option<&Keypair> {
        self.own.as_ref()
    }

    /// Own armored public key.
    pub fn own_public_key(&self) -> Option<String> {
        self.own.as_ref().map(|k| k.public().armor())
    }

    /// Fingerprint of the own public key.
    pub fn own_fingerprint(&self) -> Option<String> {
        self.own.as_ref().map(|k| fingerprint(&k.public()))
    }

    /// Fingerprint of a peer's imported key.
    pub fn peer_fingerprint(&self, peer_id: &PeerId) -> Option<String> {
        self.peers.get(peer_id).map(fingerprint)
    }

    /// Drop every key. The keypair zeroizes its secrets on drop.
    pub fn purge(&mut self) {
        self.own = None;
        self.peers.clear();
    }
}
