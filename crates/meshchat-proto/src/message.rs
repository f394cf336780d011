//! Protocol messages exchanged between participants.
//!
//! Every message is a tagged map `{ "type": "...", ...fields }`. Receivers
//! dispatch strictly on the tag; a tag this build does not know decodes to
//! [`WireMessage::Unknown`] and is ignored by the session.
//!
//! # Invariants
//!
//! - Each variant has exactly one tag (enforced by serde + match
//!   exhaustiveness in the session handlers).
//! - Encoding a message and decoding the bytes yields an equal value.

use serde::{Deserialize, Serialize};

use crate::{
    PeerId,
    errors::{ProtocolError, Result},
};

/// A participant as announced by the creator in `peer_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    /// Rendezvous identifier of the announced peer.
    pub peer_id: PeerId,
    /// Display codename.
    pub codename: String,
    /// Armored public key block.
    pub public_key: String,
}

/// All message kinds carried over a participant-to-participant channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WireMessage {
    /// Handshake: sent once per channel by each side.
    KeyExchange {
        /// Armored public key block of the sender.
        public_key: String,
        /// Sender's display codename.
        codename: String,
    },

    /// Creator → newcomer: every other connected participant.
    PeerList {
        /// Participants the newcomer should connect to.
        peers: Vec<PeerRecord>,
    },

    /// Creator → existing participants: a newcomer completed its handshake.
    PeerJoined {
        /// Newcomer's rendezvous identifier.
        peer_id: PeerId,
        /// Newcomer's codename.
        codename: String,
        /// Newcomer's armored public key block.
        public_key: String,
    },

    /// Creator → remaining participants: someone left the mesh.
    PeerLeft {
        /// Identifier of the departed participant.
        peer_id: PeerId,
    },

    /// Sender is leaving the channel.
    Leave,

    /// Encrypted, signed text message.
    Chat {
        /// Base64 sealed payload.
        ciphertext: String,
    },

    /// Encrypted, signed [`crate::FileEnvelope`].
    File {
        /// Base64 sealed payload.
        ciphertext: String,
    },

    /// Creator ends the channel for everyone.
    Close,

    /// Clear the local message display.
    Clear,

    /// Creator stopped admitting newcomers.
    EntryClosed,

    /// Creator resumed admitting newcomers.
    EntryOpened,

    /// RTT probe.
    Ping {
        /// Sender-local timestamp in milliseconds.
        timestamp: u64,
    },

    /// RTT probe reply, echoing the probe's timestamp.
    Pong {
        /// Timestamp copied from the originating `ping`.
        timestamp: u64,
    },

    /// Any tag not recognized by this build.
    #[serde(other)]
    Unknown,
}

impl WireMessage {
    /// Wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KeyExchange { .. } => "key_exchange",
            Self::PeerList { .. } => "peer_list",
            Self::PeerJoined { .. } => "peer_joined",
            Self::PeerLeft { .. } => "peer_left",
            Self::Leave => "leave",
            Self::Chat { .. } => "chat",
            Self::File { .. } => "file",
            Self::Close => "close",
            Self::Clear => "clear",
            Self::EntryClosed => "entry_closed",
            Self::EntryOpened => "entry_opened",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Unknown => "unknown",
        }
    }

    /// Whether receivers only honor this message from the channel creator.
    pub fn requires_creator_authority(&self) -> bool {
        matches!(
            self,
            Self::PeerList { .. }
                | Self::PeerJoined { .. }
                | Self::PeerLeft { .. }
                | Self::Close
                | Self::EntryClosed
                | Self::EntryOpened
        )
    }

    /// Encode to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Decode` if the bytes are not a tagged message map or a
    ///   known tag is missing required fields
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
