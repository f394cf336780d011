//! In-memory rendezvous and channel transport.
//!
//! [`SimNetwork`] hosts several sessions ("tabs") and executes their
//! [`TransportAction`]s against a simulated rendezvous service:
//!
//! - `Register` claims an identifier (or assigns `peer-N`) and fails if another
//!   tab holds it
//! - `Connect` opens a channel to a registered identifier, notifying both ends
//! - `Send` CBOR-encodes the message and queues the bytes for the other end
//! - `Close` tears a channel down and notifies the other end
//!
//! Every notification goes through one FIFO queue, so delivery on a channel is
//! ordered and a message sent before `Close` arrives before the close
//! notification. Nothing is delivered until [`SimNetwork::run_until_idle`].

use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use meshchat_core::{
    ConnectFailure, Direction, Environment, MessageKind, Session, SessionAction, SessionConfig,
    SessionError, SessionEvent, TransportAction, UiUpdate,
};
use meshchat_proto::{ChannelId, PeerId, WireMessage};

use crate::{
    SimEnv,
    invariants::{InvariantRegistry, SystemSnapshot, TabSnapshot},
};

/// Index of a tab in the simulation.
pub type TabId = usize;

/// Interval between ticks in [`SimNetwork::run_for`] and interactive drivers.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on deliveries per [`SimNetwork::run_until_idle`] call.
const MAX_DELIVERIES: usize = 100_000;

/// A message that crossed a channel, as recorded by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// Sending tab.
    pub from_tab: TabId,
    /// Receiving tab.
    pub to_tab: TabId,
    /// Sender identity as seen by the receiver.
    pub from: PeerId,
    /// Message as sent.
    pub message: WireMessage,
}

/// One open channel between two tabs, with each side's identity at connect
/// time.
#[derive(Debug, Clone)]
struct Link {
    a: TabId,
    a_id: PeerId,
    b: TabId,
    b_id: PeerId,
}

impl Link {
    /// For `local` addressing `remote_id`: the remote tab and `local`'s
    /// identity on this channel.
    fn route(&self, local: TabId, remote_id: &PeerId) -> Option<(TabId, &PeerId)> {
        if self.a == local && &self.b_id == remote_id {
            Some((self.b, &self.a_id))
        } else if self.b == local && &self.a_id == remote_id {
            Some((self.a, &self.b_id))
        } else {
            None
        }
    }

    fn joins(&self, x: TabId, y: TabId) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }
}

#[derive(Debug)]
enum Pending<I> {
    Event { tab: TabId, event: SessionEvent<I> },
    Frame { tab: TabId, from: PeerId, bytes: Vec<u8> },
}

struct Tab<E: Environment> {
    session: Session<E>,
    /// Last identifier the rendezvous acknowledged. Kept after `Unregister`
    /// because open channels still carry it.
    identity: Option<PeerId>,
    ui: Vec<UiUpdate>,
    rejected: Vec<SessionError>,
    /// Unresponsive: everything delivered to the tab is dropped.
    muted: bool,
}

/// Multi-session network over an in-memory rendezvous.
///
/// Deterministic under [`SimEnv`]; any other [`Environment`] (a real clock)
/// drives the same delivery logic with [`SimNetwork::tick`].
pub struct SimNetwork<E: Environment = SimEnv> {
    env: E,
    tabs: Vec<Tab<E>>,
    rendezvous: BTreeMap<PeerId, TabId>,
    links: Vec<Link>,
    queue: VecDeque<Pending<E::Instant>>,
    sent: Vec<SentFrame>,
    next_assigned: u64,
    invariants: Option<InvariantRegistry>,
}

impl SimNetwork<SimEnv> {
    /// Empty network with a seeded environment.
    pub fn new(seed: u64) -> Self {
        Self::with_env(SimEnv::with_seed(seed))
    }

    /// Advance virtual time once, tick every tab, and settle.
    pub fn advance(&mut self, by: Duration) {
        self.env.advance(by);
        self.tick();
    }

    /// Advance virtual time by `total` in [`TICK_INTERVAL`] steps.
    pub fn run_for(&mut self, total: Duration) {
        let mut remaining = total;
        while !remaining.is_zero() {
            let step = remaining.min(TICK_INTERVAL);
            self.advance(step);
            remaining -= step;
        }
    }
}

impl<E: Environment> SimNetwork<E> {
    /// Empty network over the given environment.
    pub fn with_env(env: E) -> Self {
        Self {
            env,
            tabs: Vec::new(),
            rendezvous: BTreeMap::new(),
            links: Vec::new(),
            queue: VecDeque::new(),
            sent: Vec::new(),
            next_assigned: 1,
            invariants: None,
        }
    }

    /// Check invariants after every [`Self::run_until_idle`].
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Shared environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Open a tab with the default configuration.
    pub fn open_tab(&mut self) -> TabId {
        self.open_tab_with(SessionConfig::default())
    }

    /// Open a tab on the landing screen.
    pub fn open_tab_with(&mut self, config: SessionConfig) -> TabId {
        self.tabs.push(Tab {
            session: Session::new(self.env.clone(), config),
            identity: None,
            ui: Vec::new(),
            rejected: Vec::new(),
            muted: false,
        });
        self.tabs.len() - 1
    }

    /// Create a channel from `tab` and settle the network.
    pub fn create(
        &mut self,
        tab: TabId,
        codename: &str,
        channel_id: &ChannelId,
    ) -> Result<(), SessionError> {
        let event =
            SessionEvent::Create { codename: codename.to_string(), channel_id: channel_id.clone() };
        self.intent(tab, event)
    }

    /// Join a channel from `tab` and settle the network.
    pub fn join(
        &mut self,
        tab: TabId,
        codename: &str,
        channel_id: &ChannelId,
    ) -> Result<(), SessionError> {
        let event =
            SessionEvent::Join { codename: codename.to_string(), channel_id: channel_id.clone() };
        self.intent(tab, event)
    }

    /// Type a line (text or `/command`) in `tab` and settle the network.
    pub fn input(&mut self, tab: TabId, line: &str) -> Result<(), SessionError> {
        self.intent(tab, SessionEvent::Input { line: line.to_string() })
    }

    /// Send a file from `tab` and settle the network.
    pub fn send_file(
        &mut self,
        tab: TabId,
        file_name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<(), SessionError> {
        let event = SessionEvent::SendFile {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            data,
        };
        self.intent(tab, event)
    }

    /// Close `tab` and settle the network.
    pub fn leave(&mut self, tab: TabId) {
        if let Err(err) = self.intent(tab, SessionEvent::Leave) {
            tracing::debug!(tab, %err, "leave rejected");
        }
    }

    /// Feed one event to a tab and settle the network.
    pub fn intent(
        &mut self,
        tab: TabId,
        event: SessionEvent<E::Instant>,
    ) -> Result<(), SessionError> {
        self.dispatch(tab, event)?;
        self.run_until_idle();
        Ok(())
    }

    /// Feed one event to a tab and execute the resulting actions without
    /// delivering anything.
    pub fn dispatch(
        &mut self,
        tab: TabId,
        event: SessionEvent<E::Instant>,
    ) -> Result<(), SessionError> {
        let actions = self.tabs[tab].session.handle(event)?;
        self.execute(tab, actions);
        Ok(())
    }

    /// Deliver a message to `tab` as if it arrived on the channel to `from`,
    /// bypassing the channel bookkeeping, and settle the network.
    pub fn inject(&mut self, tab: TabId, from: &PeerId, message: WireMessage) {
        self.deliver(tab, SessionEvent::MessageReceived { from: from.clone(), message });
        self.run_until_idle();
    }

    /// Deliver a recorded frame again if its channel is still open. Returns
    /// whether it was queued.
    pub fn redeliver(&mut self, frame: &SentFrame) -> bool {
        let open = self.links.iter().any(|link| {
            link.route(frame.to_tab, &frame.from).is_some_and(|(t, _)| t == frame.from_tab)
        });
        if !open {
            return false;
        }

        self.transmit(frame.from_tab, frame.to_tab, frame.from.clone(), frame.message.clone());
        true
    }

    /// Drop `tab`'s rendezvous connection. Its open channels stay up.
    pub fn disconnect_rendezvous(&mut self, tab: TabId) {
        self.rendezvous.retain(|_, owner| *owner != tab);
        self.queue.push_back(Pending::Event { tab, event: SessionEvent::RendezvousDisconnected });
        self.run_until_idle();
    }

    /// Freeze a tab: it keeps its registration and channels but never
    /// processes another event.
    pub fn mute(&mut self, tab: TabId) {
        self.tabs[tab].muted = true;
    }

    /// Break every channel between two tabs, notifying both ends.
    pub fn sever(&mut self, x: TabId, y: TabId) {
        let (severed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.links).into_iter().partition(|link| link.joins(x, y));
        self.links = kept;

        for link in severed {
            self.queue.push_back(Pending::Event {
                tab: link.a,
                event: SessionEvent::ChannelClosed { peer_id: link.b_id },
            });
            self.queue.push_back(Pending::Event {
                tab: link.b,
                event: SessionEvent::ChannelClosed { peer_id: link.a_id },
            });
        }
        self.run_until_idle();
    }

    /// Tick every tab at the environment's current time and settle.
    pub fn tick(&mut self) {
        let now = self.env.now();
        for tab in 0..self.tabs.len() {
            self.deliver(tab, SessionEvent::Tick { now });
        }
        self.run_until_idle();
    }

    /// Deliver queued notifications and messages until nothing is pending.
    /// Returns the number of deliveries.
    pub fn run_until_idle(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(pending) = self.queue.pop_front() {
            if delivered == MAX_DELIVERIES {
                tracing::warn!(pending = self.queue.len() + 1, "delivery limit reached");
                self.queue.push_front(pending);
                break;
            }
            delivered += 1;

            match pending {
                Pending::Event { tab, event } => self.deliver(tab, event),
                Pending::Frame { tab, from, bytes } => match WireMessage::decode(&bytes) {
                    Ok(message) => {
                        self.deliver(tab, SessionEvent::MessageReceived { from, message });
                    },
                    Err(err) => tracing::warn!(tab, %from, %err, "dropping undecodable frame"),
                },
            }
        }

        if let Some(registry) = &self.invariants {
            registry.assert_all(&self.snapshot(), "after delivery");
        }
        delivered
    }

    /// Session in a tab.
    pub fn session(&self, tab: TabId) -> &Session<E> {
        &self.tabs[tab].session
    }

    /// Identifier the rendezvous last acknowledged for a tab.
    pub fn identity(&self, tab: TabId) -> Option<&PeerId> {
        self.tabs[tab].identity.as_ref()
    }

    /// Number of tabs ever opened.
    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    /// Presentation updates a tab received, oldest first.
    pub fn ui(&self, tab: TabId) -> &[UiUpdate] {
        &self.tabs[tab].ui
    }

    /// Drain a tab's presentation updates.
    pub fn take_ui(&mut self, tab: TabId) -> Vec<UiUpdate> {
        std::mem::take(&mut self.tabs[tab].ui)
    }

    /// Text of every rendered line of one kind.
    pub fn lines(&self, tab: TabId, kind: MessageKind) -> Vec<&str> {
        self.tabs[tab]
            .ui
            .iter()
            .filter_map(|update| match update {
                UiUpdate::AppendMessage { kind: k, text, .. } if *k == kind => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Network-driven events a tab's session rejected.
    pub fn rejected(&self, tab: TabId) -> &[SessionError] {
        &self.tabs[tab].rejected
    }

    /// Every message that crossed a channel, in send order.
    pub fn sent(&self) -> &[SentFrame] {
        &self.sent
    }

    /// Tab holding a rendezvous identifier.
    pub fn registered(&self, peer_id: &PeerId) -> Option<TabId> {
        self.rendezvous.get(peer_id).copied()
    }

    /// Whether a channel between two tabs is open at the network level.
    pub fn linked(&self, x: TabId, y: TabId) -> bool {
        self.links.iter().any(|link| link.joins(x, y))
    }

    /// Observable state of every tab.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::from_tabs(
            self.tabs
                .iter()
                .enumerate()
                .map(|(id, tab)| TabSnapshot::from_session(id, &tab.session, tab.identity.clone()))
                .collect(),
        )
    }

    fn deliver(&mut self, tab: TabId, event: SessionEvent<E::Instant>) {
        if self.tabs[tab].muted {
            return;
        }
        match self.tabs[tab].session.handle(event) {
            Ok(actions) => self.execute(tab, actions),
            Err(err) => {
                tracing::debug!(tab, %err, "session rejected event");
                self.tabs[tab].rejected.push(err);
            },
        }
    }

    fn execute(&mut self, tab: TabId, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::Transport(action) => self.transport(tab, action),
                SessionAction::Ui(update) => self.tabs[tab].ui.push(update),
            }
        }
    }

    fn transport(&mut self, tab: TabId, action: TransportAction) {
        match action {
            TransportAction::Register { peer_id } => self.register(tab, peer_id),
            TransportAction::Unregister => {
                self.rendezvous.retain(|_, owner| *owner != tab);
            },
            TransportAction::Connect { peer_id } => self.connect(tab, peer_id),
            TransportAction::Send { to, message } => {
                match self.links.iter().find_map(|link| link.route(tab, &to)) {
                    Some((remote, from)) => {
                        let from = from.clone();
                        self.transmit(tab, remote, from, message);
                    },
                    None => tracing::trace!(tab, %to, kind = message.kind(), "no channel, dropped"),
                }
            },
            TransportAction::Close { peer_id } => {
                let position =
                    self.links.iter().position(|link| link.route(tab, &peer_id).is_some());
                let Some(index) = position else {
                    return;
                };
                let link = self.links.remove(index);
                if let Some((remote, own_id)) = link.route(tab, &peer_id) {
                    self.queue.push_back(Pending::Event {
                        tab: remote,
                        event: SessionEvent::ChannelClosed { peer_id: own_id.clone() },
                    });
                }
            },
        }
    }

    fn register(&mut self, tab: TabId, requested: Option<PeerId>) {
        let peer_id = requested.unwrap_or_else(|| {
            let assigned = PeerId::new(format!("peer-{}", self.next_assigned));
            self.next_assigned += 1;
            assigned
        });

        let event = match self.rendezvous.get(&peer_id) {
            Some(owner) if *owner != tab => {
                let reason = format!("identifier {peer_id} is taken");
                SessionEvent::RegistrationFailed { reason }
            },
            _ => {
                self.rendezvous.insert(peer_id.clone(), tab);
                self.tabs[tab].identity = Some(peer_id.clone());
                SessionEvent::Registered { peer_id }
            },
        };
        self.queue.push_back(Pending::Event { tab, event });
    }

    fn connect(&mut self, tab: TabId, peer_id: PeerId) {
        let Some(own_id) = self.tabs[tab].identity.clone() else {
            let failure = ConnectFailure::Network("not registered".to_string());
            let event = SessionEvent::ConnectFailed { peer_id, failure };
            self.queue.push_back(Pending::Event { tab, event });
            return;
        };

        let Some(remote) = self.registered(&peer_id) else {
            let failure = ConnectFailure::PeerUnavailable;
            let event = SessionEvent::ConnectFailed { peer_id, failure };
            self.queue.push_back(Pending::Event { tab, event });
            return;
        };

        tracing::trace!(tab, remote, %peer_id, "channel opened");
        self.links.push(Link { a: tab, a_id: own_id.clone(), b: remote, b_id: peer_id.clone() });
        self.queue.push_back(Pending::Event {
            tab,
            event: SessionEvent::ChannelOpened { peer_id, direction: Direction::Outbound },
        });
        self.queue.push_back(Pending::Event {
            tab: remote,
            event: SessionEvent::ChannelOpened { peer_id: own_id, direction: Direction::Inbound },
        });
    }

    fn transmit(&mut self, from_tab: TabId, to_tab: TabId, from: PeerId, message: WireMessage) {
        match message.encode() {
            Ok(bytes) => {
                self.queue.push_back(Pending::Frame { tab: to_tab, from: from.clone(), bytes });
                self.sent.push(SentFrame { from_tab, to_tab, from, message });
            },
            Err(err) => tracing::warn!(from_tab, %err, "dropping unencodable message"),
        }
    }
}
