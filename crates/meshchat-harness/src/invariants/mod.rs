//! Invariant checking for deterministic simulation.
//!
//! Invariants are properties that must always hold. Unlike scenario tests that
//! check one sequence of events, they are asserted after every settled step of
//! any sequence.
//!
//! # Usage
//!
//! ```ignore
//! let mut net = SimNetwork::new(42).with_invariants(InvariantRegistry::standard());
//! // every run_until_idle now asserts the standard invariants
//! ```

mod checks;
mod snapshot;

pub use checks::{
    ConnectedHasChannel, FullMesh, KeypairWhileActive, KeysMatchParticipants, NoSelfParticipant,
    PurgedWhenInactive, SingleCreatorPerChannel,
};
pub use snapshot::{SystemSnapshot, TabSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a [`SystemSnapshot`].
pub trait Invariant: Send + Sync {
    /// Name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with the invariants that hold at every quiescent point:
    ///
    /// - [`PurgedWhenInactive`]
    /// - [`KeypairWhileActive`]
    /// - [`KeysMatchParticipants`]
    /// - [`NoSelfParticipant`]
    /// - [`SingleCreatorPerChannel`]
    /// - [`ConnectedHasChannel`]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(PurgedWhenInactive);
        registry.add(KeypairWhileActive);
        registry.add(KeysMatchParticipants);
        registry.add(NoSelfParticipant);
        registry.add(SingleCreatorPerChannel);
        registry.add(ConnectedHasChannel);
        registry
    }

    /// Add an invariant.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants, collecting every violation.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether no invariants are registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use meshchat_core::SessionState;
    use meshchat_proto::PeerId;

    use super::*;

    fn tab(state: SessionState) -> TabSnapshot {
        TabSnapshot {
            tab: 0,
            state,
            is_creator: false,
            entry_open: true,
            channel_id: None,
            identity: Some(PeerId::new("peer-1")),
            fingerprint: None,
            participants: BTreeMap::new(),
            keyed: BTreeSet::new(),
            peer_key_count: 0,
            open_channels: BTreeSet::new(),
        }
    }

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn empty_snapshot_passes() {
        assert!(InvariantRegistry::standard().check_all(&SystemSnapshot::empty()).is_ok());
    }

    #[test]
    fn leftover_keys_after_destroy_are_reported() {
        let mut destroyed = tab(SessionState::Destroyed);
        destroyed.fingerprint = Some("AAAA".to_string());

        let violations = InvariantRegistry::standard()
            .check_all(&SystemSnapshot::from_tabs(vec![destroyed]))
            .unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "purged_when_inactive");
    }

    #[test]
    fn self_listing_is_reported() {
        let mut chat = tab(SessionState::Chat);
        chat.fingerprint = Some("AAAA".to_string());
        chat.participants.insert(PeerId::new("peer-1"), false);
        chat.keyed.insert(PeerId::new("peer-1"));
        chat.peer_key_count = 1;

        let violations = InvariantRegistry::standard()
            .check_all(&SystemSnapshot::from_tabs(vec![chat]))
            .unwrap_err();
        assert_eq!(violations[0].invariant, "no_self_participant");
    }
}
