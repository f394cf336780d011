//! Connection registry for rendezvous registration and peer channels.
//!
//! The registry is pure bookkeeping: it tracks one channel per remote peer,
//! whether we are registered with the rendezvous, and the pending join
//! attempt, and returns [`TransportAction`]s for the driver to execute.
//!
//! # Invariants
//!
//! - At most one channel (connecting or open) per peer identifier.
//! - `send_to`/`broadcast` only address open channels. Anything else is
//!   dropped: no queuing, no retry.
//! - `connect_to` never duplicates a channel and never runs without an
//!   active registration.

use std::{collections::BTreeMap, time::Duration};

use meshchat_proto::{PeerId, WireMessage};

use crate::{
    error::JoinError,
    event::{ConnectFailure, Direction, TransportAction},
};

/// Lifecycle of a peer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Outbound attempt in flight.
    Connecting,
    /// Established; messages flow.
    Open,
}

/// Outcome of an opened channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Channel recorded as open.
    Admitted,
    /// Entry is closed; the channel must be torn down.
    Refused(TransportAction),
}

/// Whether we want to be reachable on the rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    None,
    Listening,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Registration {
    Idle,
    Pending,
    Active(PeerId),
}

#[derive(Debug, Clone)]
struct PendingJoin<I> {
    target: PeerId,
    started_at: I,
}

/// Registry of peer channels and rendezvous registration.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry<I> {
    channels: BTreeMap<PeerId, ChannelState>,
    registration: Registration,
    intent: Intent,
    /// Last identifier we asked for or were assigned; reused on re-register.
    preferred_id: Option<PeerId>,
    pending_join: Option<PendingJoin<I>>,
    entry_open: bool,
}

impl<I> Default for ConnectionRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> ConnectionRegistry<I> {
    /// Create an idle registry.
    pub fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
            registration: Registration::Idle,
            intent: Intent::None,
            preferred_id: None,
            pending_join: None,
            entry_open: true,
        }
    }

    /// Register at the creator's derived identifier and accept inbound
    /// channels.
    pub fn create_as_rendezvous(&mut self, creator_id: PeerId) -> Vec<TransportAction> {
        self.intent = Intent::Listening;
        self.entry_open = true;
        self.registration = Registration::Pending;
        self.preferred_id = Some(creator_id.clone());
        vec![TransportAction::Register { peer_id: Some(creator_id) }]
    }

    /// Start a join: register for an assigned identifier, then connect to the
    /// creator once registration is acknowledged.
    ///
    /// The deadline is measured from `now` and checked by
    /// [`Self::check_join_timeout`].
    pub fn join_as_rendezvous_client(&mut self, target: PeerId, now: I) -> Vec<TransportAction> {
        self.intent = Intent::Listening;
        self.entry_open = true;
        self.registration = Registration::Pending;
        self.pending_join = Some(PendingJoin { target, started_at: now });
        vec![TransportAction::Register { peer_id: None }]
    }

    /// Rendezvous acknowledged our registration.
    pub fn on_registered(&mut self, peer_id: PeerId) -> Vec<TransportAction> {
        self.registration = Registration::Active(peer_id.clone());
        self.preferred_id = Some(peer_id);

        let Some(target) = self.pending_join.as_ref().map(|p| p.target.clone()) else {
            return Vec::new();
        };
        self.connect_to(&target).into_iter().collect()
    }

    /// Rendezvous refused our registration.
    pub fn on_registration_failed(&mut self) {
        self.registration = Registration::Idle;
    }

    /// Lost the rendezvous connection. Re-registers while registration is
    /// intended; never after entry was intentionally closed.
    pub fn on_rendezvous_disconnected(&mut self) -> Vec<TransportAction> {
        self.registration = Registration::Idle;
        if self.intent != Intent::Listening {
            return Vec::new();
        }

        tracing::info!(peer_id = ?self.preferred_id, "re-registering with rendezvous");
        self.registration = Registration::Pending;
        vec![TransportAction::Register { peer_id: self.preferred_id.clone() }]
    }

    /// A channel reached the open state.
    pub fn on_channel_opened(&mut self, peer_id: &PeerId, direction: Direction) -> Admission {
        if direction == Direction::Inbound && !self.entry_open {
            tracing::info!(%peer_id, "entry closed, refusing inbound channel");
            self.channels.remove(peer_id);
            return Admission::Refused(TransportAction::Close { peer_id: peer_id.clone() });
        }

        self.channels.insert(peer_id.clone(), ChannelState::Open);
        Admission::Admitted
    }

    /// An outbound attempt failed. Returns the join failure if it was the
    /// join target.
    pub fn on_connect_failed(
        &mut self,
        peer_id: &PeerId,
        failure: ConnectFailure,
    ) -> Option<JoinError> {
        self.channels.remove(peer_id);
        self.take_join_for(peer_id)?;

        Some(match failure {
            ConnectFailure::PeerUnavailable => JoinError::PeerUnavailable,
            ConnectFailure::Network(reason) => JoinError::Network { reason },
        })
    }

    /// A channel closed. Returns the join failure if the join target hung up
    /// before the handshake completed.
    pub fn on_channel_closed(&mut self, peer_id: &PeerId) -> Option<JoinError> {
        self.channels.remove(peer_id);
        self.take_join_for(peer_id)?;

        Some(JoinError::Network { reason: "channel closed before handshake completed".to_string() })
    }

    /// The join target's handshake completed. Returns whether a join was
    /// pending for this peer.
    pub fn complete_join(&mut self, peer_id: &PeerId) -> bool {
        self.take_join_for(peer_id).is_some()
    }

    /// Whether a join attempt is in flight.
    pub fn is_joining(&self) -> bool {
        self.pending_join.is_some()
    }

    /// Open a direct channel to a third party.
    ///
    /// No-op if a channel exists (connecting or open), if `peer_id` is our own
    /// identifier, or if we hold no active registration.
    pub fn connect_to(&mut self, peer_id: &PeerId) -> Option<TransportAction> {
        let Registration::Active(own_id) = &self.registration else {
            tracing::debug!(%peer_id, "not registered, skipping connect");
            return None;
        };
        if own_id == peer_id || self.channels.contains_key(peer_id) {
            return None;
        }

        self.channels.insert(peer_id.clone(), ChannelState::Connecting);
        Some(TransportAction::Connect { peer_id: peer_id.clone() })
    }

    /// Address one open channel. Dropped silently if not open.
    pub fn send_to(&self, peer_id: &PeerId, message: WireMessage) -> Option<TransportAction> {
        if self.is_open(peer_id) {
            Some(TransportAction::Send { to: peer_id.clone(), message })
        } else {
            tracing::trace!(%peer_id, kind = message.kind(), "channel not open, dropping");
            None
        }
    }

    /// Address every open channel except `exclude`.
    pub fn broadcast(
        &self,
        message: &WireMessage,
        exclude: Option<&PeerId>,
    ) -> Vec<TransportAction> {
        self.open_peers()
            .filter(|peer| Some(*peer) != exclude)
            .map(|peer| TransportAction::Send { to: peer.clone(), message: message.clone() })
            .collect()
    }

    /// Close one channel.
    pub fn close_channel(&mut self, peer_id: &PeerId) -> Option<TransportAction> {
        self.channels
            .remove(peer_id)
            .map(|_| TransportAction::Close { peer_id: peer_id.clone() })
    }

    /// Stop admitting newcomers: unregister and refuse new inbound channels.
    /// Open channels are untouched.
    pub fn close_entry(&mut self) -> Vec<TransportAction> {
        self.entry_open = false;
        self.intent = Intent::Closed;
        self.release_registration()
    }

    /// Resume admitting newcomers.
    pub fn open_entry(&mut self) -> Vec<TransportAction> {
        self.entry_open = true;
        self.intent = Intent::Listening;
        if self.registration != Registration::Idle {
            return Vec::new();
        }

        self.registration = Registration::Pending;
        vec![TransportAction::Register { peer_id: self.preferred_id.clone() }]
    }

    /// Close every channel and release the registration.
    pub fn destroy(&mut self) -> Vec<TransportAction> {
        let mut actions: Vec<TransportAction> = std::mem::take(&mut self.channels)
            .into_keys()
            .map(|peer_id| TransportAction::Close { peer_id })
            .collect();
        actions.extend(self.release_registration());

        self.intent = Intent::None;
        self.pending_join = None;
        self.preferred_id = None;
        self.entry_open = false;
        actions
    }

    /// Identifier we are registered at.
    pub fn own_id(&self) -> Option<&PeerId> {
        match &self.registration {
            Registration::Active(id) => Some(id),
            Registration::Idle | Registration::Pending => None,
        }
    }

    /// Whether registration is acknowledged.
    pub fn is_registered(&self) -> bool {
        matches!(self.registration, Registration::Active(_))
    }

    /// Whether new inbound channels are admitted.
    pub fn entry_open(&self) -> bool {
        self.entry_open
    }

    /// State of the channel to a peer.
    pub fn channel_state(&self, peer_id: &PeerId) -> Option<ChannelState> {
        self.channels.get(peer_id).copied()
    }

    /// Whether the channel to a peer is open.
    pub fn is_open(&self, peer_id: &PeerId) -> bool {
        self.channel_state(peer_id) == Some(ChannelState::Open)
    }

    /// Peers with an open channel.
    pub fn open_peers(&self) -> impl Iterator<Item = &PeerId> {
        self.channels.iter().filter(|(_, s)| **s == ChannelState::Open).map(|(p, _)| p)
    }

    /// Number of open channels.
    pub fn open_count(&self) -> usize {
        self.open_peers().count()
    }

    fn release_registration(&mut self) -> Vec<TransportAction> {
        if self.registration == Registration::Idle {
            return Vec::new();
        }
        self.registration = Registration::Idle;
        vec![TransportAction::Unregister]
    }

    fn take_join_for(&mut self, peer_id: &PeerId) -> Option<PendingJoin<I>> {
        if self.pending_join.as_ref().is_some_and(|p| &p.target == peer_id) {
            self.pending_join.take()
        } else {
            None
        }
    }
}

impl<I: Copy + std::ops::Sub<Output = Duration>> ConnectionRegistry<I> {
    /// Abandon the join if the deadline has passed.
    pub fn check_join_timeout(&mut self, now: I, timeout: Duration) -> Option<JoinError> {
        let elapsed = now - self.pending_join.as_ref()?.started_at;
        if elapsed < timeout {
            return None;
        }

        let pending = self.pending_join.take()?;
        self.channels.remove(&pending.target);
        Some(JoinError::RequestTimeout { elapsed })
    }
}
