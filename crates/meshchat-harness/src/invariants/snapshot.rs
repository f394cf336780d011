//! Observable state snapshots for invariant checking.
//!
//! Invariants operate on snapshots rather than live sessions so a check sees
//! one consistent moment across every tab.

use std::collections::{BTreeMap, BTreeSet};

use meshchat_core::{Environment, Session, SessionState};
use meshchat_proto::{ChannelId, PeerId};

/// Snapshot of every tab in a simulation.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-tab snapshots.
    pub tabs: Vec<TabSnapshot>,
}

impl SystemSnapshot {
    /// Snapshot with no tabs.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot from per-tab snapshots.
    pub fn from_tabs(tabs: Vec<TabSnapshot>) -> Self {
        Self { tabs }
    }

    /// Tabs in `Waiting` or `Chat`.
    pub fn active(&self) -> impl Iterator<Item = &TabSnapshot> {
        self.tabs.iter().filter(|tab| tab.is_active())
    }
}

/// Observable state of one session.
#[derive(Debug, Clone)]
pub struct TabSnapshot {
    /// Tab index.
    pub tab: usize,
    /// Screen.
    pub state: SessionState,
    /// Role.
    pub is_creator: bool,
    /// Entry flag as this tab sees it.
    pub entry_open: bool,
    /// Channel created or joined.
    pub channel_id: Option<ChannelId>,
    /// Identity the rendezvous last acknowledged for this tab.
    pub identity: Option<PeerId>,
    /// Own fingerprint, `None` once purged.
    pub fingerprint: Option<String>,
    /// Participants and whether each completed a direct handshake.
    pub participants: BTreeMap<PeerId, bool>,
    /// Participants with an imported key.
    pub keyed: BTreeSet<PeerId>,
    /// Number of imported keys.
    pub peer_key_count: usize,
    /// Peers with an open channel.
    pub open_channels: BTreeSet<PeerId>,
}

impl TabSnapshot {
    /// Capture a session.
    pub fn from_session<E: Environment>(
        tab: usize,
        session: &Session<E>,
        identity: Option<PeerId>,
    ) -> Self {
        let participants: BTreeMap<PeerId, bool> = session
            .participants()
            .iter()
            .map(|(peer_id, p)| (peer_id.clone(), p.connected))
            .collect();
        let keyed =
            participants.keys().filter(|peer_id| session.has_peer_key(peer_id)).cloned().collect();

        Self {
            tab,
            state: session.state(),
            is_creator: session.is_creator(),
            entry_open: session.entry_open(),
            channel_id: session.channel_id().cloned(),
            identity,
            fingerprint: session.fingerprint(),
            participants,
            keyed,
            peer_key_count: session.peer_key_count(),
            open_channels: session.open_channels().into_iter().collect(),
        }
    }

    /// Whether the session is in `Waiting` or `Chat`.
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Waiting | SessionState::Chat)
    }

    /// Whether `peer_id` is a participant with a completed handshake.
    pub fn is_connected_to(&self, peer_id: &PeerId) -> bool {
        self.participants.get(peer_id).copied().unwrap_or(false)
    }
}
