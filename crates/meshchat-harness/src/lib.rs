//! Deterministic simulation harness for meshchat sessions.
//!
//! [`SimEnv`] supplies a virtual clock and a seeded RNG; [`SimNetwork`] runs
//! any number of sessions over an in-memory rendezvous and ordered channels,
//! pushing every message through the wire codec. Runs with the same seed and
//! the same operations are identical.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties against a
//! [`SystemSnapshot`] of every tab. Use [`InvariantRegistry::standard()`] for
//! the properties that hold at every quiescent point.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod sim_network;

pub use invariants::{
    ConnectedHasChannel, FullMesh, Invariant, InvariantRegistry, InvariantResult,
    KeypairWhileActive, KeysMatchParticipants, NoSelfParticipant, PurgedWhenInactive,
    SingleCreatorPerChannel, SystemSnapshot, TabSnapshot, Violation,
};
pub use sim_env::SimEnv;
pub use sim_network::{SentFrame, SimNetwork, TICK_INTERVAL, TabId};
