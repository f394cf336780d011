//! Meshchat Core
//!
//! Session protocol and mesh coordination engine for ephemeral, end-to-end
//! encrypted group chat. A creator registers at an identifier derived from the
//! channel code; joiners connect to it, exchange keys, and are introduced to
//! every other participant so the group converges on a full mesh.
//!
//! # Architecture
//!
//! Sans-IO and action-based: [`Session`] consumes [`SessionEvent`]s (transport
//! notifications, decoded wire messages, user intents, clock ticks) and returns
//! [`SessionAction`]s for the caller to execute. Time and randomness come from
//! an [`Environment`], so the same state machine runs under a real clock and in
//! deterministic simulation.
//!
//! # Components
//!
//! - [`KeyStore`]: own keypair and imported peer keys
//! - [`ConnectionRegistry`]: rendezvous registration and one channel per peer
//! - [`EncryptionGateway`]: seal for all peers, open and verify per sender
//! - [`Session`]: the state machine and wire message handlers
//! - [`parse_command`]: `/command` dispatcher

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod command;
mod config;
mod env;
mod error;
mod event;
mod gateway;
mod key_store;
mod registry;
mod session;

pub use command::{Command, CommandError, HELP_TEXT, parse_command};
pub use config::{AdmissionPolicy, SessionConfig};
pub use env::Environment;
pub use error::{JoinError, SessionError};
pub use event::{
    ConnectFailure, Direction, MemberView, MessageKind, ReceivedFile, SessionAction, SessionEvent,
    TransportAction, UiUpdate,
};
pub use gateway::{Decrypted, EncryptionGateway};
pub use key_store::KeyStore;
pub use registry::{Admission, ChannelState, ConnectionRegistry};
pub use session::{Participant, Session, SessionState};
