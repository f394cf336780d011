//! Meshchat wire protocol.
//!
//! Everything that crosses a channel between two participants lives here:
//! peer and channel identifiers, the closed set of [`WireMessage`] kinds, the
//! encrypted file envelope, and the validation rules receivers apply before
//! trusting any of it.
//!
//! The transport collaborator delivers structured messages. When a byte
//! representation is needed (simulation, fuzzing, framing transports) the
//! messages are CBOR-encoded with an explicit `type` tag.
//!
//! # Components
//!
//! - [`PeerId`], [`ChannelId`]: identifiers and the creator-id derivation
//! - [`WireMessage`]: one variant per protocol message kind
//! - [`FileEnvelope`]: metadata + payload carried inside an encrypted `file`
//! - [`validate_codename`], [`FileEnvelope::validate`]: receiver-side checks

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod errors;
mod file;
mod ids;
mod message;

pub use errors::{ProtocolError, Result};
pub use file::{ENCODING_OVERHEAD_PERCENT, FileEnvelope, MAX_FILE_NAME_LEN};
pub use ids::{ChannelId, MAX_CODENAME_LEN, PeerId, validate_codename};
pub use message::{PeerRecord, WireMessage};
