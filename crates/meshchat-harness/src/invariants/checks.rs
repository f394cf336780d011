//! Standard invariant checks.
//!
//! These capture properties that hold at every quiescent point of a
//! simulation, whatever sequence of joins, leaves and messages led there.

use std::collections::BTreeMap;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Sessions outside `Waiting`/`Chat` hold no key material, no participants
/// and no channels.
pub struct PurgedWhenInactive;

impl Invariant for PurgedWhenInactive {
    fn name(&self) -> &'static str {
        "purged_when_inactive"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for tab in state.tabs.iter().filter(|tab| !tab.is_active()) {
            if tab.fingerprint.is_some()
                || tab.peer_key_count > 0
                || !tab.participants.is_empty()
                || !tab.open_channels.is_empty()
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "tab {} in {}: fingerprint {:?}, {} keys, {} participants, {} channels",
                        tab.tab,
                        tab.state,
                        tab.fingerprint,
                        tab.peer_key_count,
                        tab.participants.len(),
                        tab.open_channels.len()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Active sessions always hold their own keypair.
pub struct KeypairWhileActive;

impl Invariant for KeypairWhileActive {
    fn name(&self) -> &'static str {
        "keypair_while_active"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        match state.active().find(|tab| tab.fingerprint.is_none()) {
            Some(tab) => Err(Violation {
                invariant: self.name(),
                message: format!("tab {} in {} has no keypair", tab.tab, tab.state),
            }),
            None => Ok(()),
        }
    }
}

/// The key store holds exactly one key per known participant.
///
/// Keys are imported together with the participant record and removed with
/// it, so the two never drift apart.
pub struct KeysMatchParticipants;

impl Invariant for KeysMatchParticipants {
    fn name(&self) -> &'static str {
        "keys_match_participants"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for tab in &state.tabs {
            let unkeyed: Vec<_> =
                tab.participants.keys().filter(|peer_id| !tab.keyed.contains(*peer_id)).collect();
            if !unkeyed.is_empty() || tab.peer_key_count != tab.participants.len() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "tab {}: {} keys for {} participants, unkeyed {unkeyed:?}",
                        tab.tab,
                        tab.peer_key_count,
                        tab.participants.len()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A session never lists itself as a participant.
pub struct NoSelfParticipant;

impl Invariant for NoSelfParticipant {
    fn name(&self) -> &'static str {
        "no_self_participant"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for tab in &state.tabs {
            if let Some(identity) = &tab.identity {
                if tab.participants.contains_key(identity) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("tab {} lists its own identity {identity}", tab.tab),
                    });
                }
            }
        }
        Ok(())
    }
}

/// At most one active creator per channel.
pub struct SingleCreatorPerChannel;

impl Invariant for SingleCreatorPerChannel {
    fn name(&self) -> &'static str {
        "single_creator_per_channel"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut creators: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for tab in state.active().filter(|tab| tab.is_creator) {
            if let Some(channel_id) = &tab.channel_id {
                creators.entry(channel_id.as_str()).or_default().push(tab.tab);
            }
        }

        match creators.into_iter().find(|(_, tabs)| tabs.len() > 1) {
            Some((channel_id, tabs)) => Err(Violation {
                invariant: self.name(),
                message: format!("channel {channel_id} has creators {tabs:?}"),
            }),
            None => Ok(()),
        }
    }
}

/// A participant marked connected has an open channel.
pub struct ConnectedHasChannel;

impl Invariant for ConnectedHasChannel {
    fn name(&self) -> &'static str {
        "connected_has_channel"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for tab in &state.tabs {
            for (peer_id, connected) in &tab.participants {
                if *connected && !tab.open_channels.contains(peer_id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "tab {}: {peer_id} connected without an open channel",
                            tab.tab
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every pair of chatting sessions in one channel is directly connected.
///
/// Holds only once the network is idle and no channel was severed; not part
/// of [`super::InvariantRegistry::standard`].
pub struct FullMesh;

impl Invariant for FullMesh {
    fn name(&self) -> &'static str {
        "full_mesh"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let chatting: Vec<_> = state
            .tabs
            .iter()
            .filter(|tab| tab.state == meshchat_core::SessionState::Chat)
            .collect();

        for x in &chatting {
            for y in &chatting {
                if x.tab == y.tab || x.channel_id != y.channel_id {
                    continue;
                }
                let Some(y_id) = &y.identity else { continue };
                if !x.is_connected_to(y_id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "tab {} is not connected to tab {} ({y_id})",
                            x.tab, y.tab
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
