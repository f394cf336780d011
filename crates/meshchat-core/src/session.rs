//! Session State Machine.
//!
//! One [`Session`] per open tab. It owns membership, role, the entry flag, the
//! key store and the connection registry, and is driven entirely by
//! [`SessionEvent`]s. Every handler returns [`SessionAction`]s; nothing here
//! performs I/O or reads the wall clock except through [`Environment`].
//!
//! ```text
//! Landing ─create/join─> Waiting ─own key_exchange─> Chat ──> Destroyed
//!                          │                                    │
//!                          └─registration/join failure─> Error  │
//!                                                          │    │
//!                 Landing <──────── ReturnToLanding ───────┴────┘
//! ```
//!
//! # Invariants
//!
//! - `is_creator` is fixed from create/join until the session returns to
//!   landing.
//! - Creator-only messages (`peer_list`, `peer_joined`, `peer_left`, `close`,
//!   `entry_closed`, `entry_opened`) are ignored unless they arrive on the
//!   channel to the creator's derived identifier.
//! - A duplicate `key_exchange` from a connected peer never re-announces the
//!   peer.
//! - Removing a participant is idempotent.
//! - Every exit path broadcasts `leave` before closing channels and purging
//!   keys.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    time::Duration,
};

use meshchat_crypto::{KEYPAIR_SEED_SIZE, SEAL_SEED_SIZE, is_armored_public_key};
use meshchat_proto::{
    ChannelId, FileEnvelope, PeerId, PeerRecord, WireMessage, validate_codename,
};
use zeroize::Zeroize;

use crate::{
    command::{Command, HELP_TEXT, parse_command},
    config::{AdmissionPolicy, SessionConfig},
    env::Environment,
    error::{JoinError, SessionError},
    event::{
        ConnectFailure, Direction, MemberView, MessageKind, ReceivedFile, SessionAction,
        SessionEvent, TransportAction, UiUpdate,
    },
    gateway::EncryptionGateway,
    key_store::KeyStore,
    registry::{Admission, ConnectionRegistry},
};

/// Screens of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Start screen: nothing registered, no keys.
    Landing,
    /// Registered (creator) or joining; no completed handshake yet.
    Waiting,
    /// Own handshake completed.
    Chat,
    /// Torn down. Terminal for this session instance.
    Destroyed,
    /// Registration or join failed.
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Landing => "landing",
            Self::Waiting => "waiting",
            Self::Chat => "chat",
            Self::Destroyed => "destroyed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// A remote member of the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Display codename.
    pub codename: String,
    /// Armored public key, forwarded to newcomers in `peer_list`.
    pub public_key: String,
    /// Whether our own direct channel to this participant completed its
    /// handshake.
    pub connected: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingPing<I> {
    timestamp: u64,
    sent_at: I,
}

/// Why a teardown is scheduled. A remote close outranks being alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeardownCause {
    CreatorClosed,
    Alone,
}

#[derive(Debug, Clone, Copy)]
struct Teardown<I> {
    at: I,
    cause: TeardownCause,
}

type Actions = Vec<SessionAction>;

/// Session state machine for one participant.
pub struct Session<E: Environment> {
    env: E,
    config: SessionConfig,
    state: SessionState,
    codename: String,
    channel_id: Option<ChannelId>,
    creator_id: Option<PeerId>,
    is_creator: bool,
    entry_open: bool,
    keys: KeyStore,
    registry: ConnectionRegistry<E::Instant>,
    participants: BTreeMap<PeerId, Participant>,
    pending_pings: HashMap<PeerId, PendingPing<E::Instant>>,
    /// Channels our own `key_exchange` went out on.
    key_sent: HashSet<PeerId>,
    /// Origin of ping timestamps.
    origin: E::Instant,
    session_start: Option<E::Instant>,
    teardown_requested: Option<Teardown<E::Instant>>,
}

impl<E: Environment> Session<E> {
    /// Create a session on the landing screen.
    pub fn new(env: E, config: SessionConfig) -> Self {
        let origin = env.now();
        Self {
            env,
            config,
            state: SessionState::Landing,
            codename: String::new(),
            channel_id: None,
            creator_id: None,
            is_creator: false,
            entry_open: true,
            keys: KeyStore::new(),
            registry: ConnectionRegistry::new(),
            participants: BTreeMap::new(),
            pending_pings: HashMap::new(),
            key_sent: HashSet::new(),
            origin,
            session_start: None,
            teardown_requested: None,
        }
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// Only for caller misuse: an intent that is not valid in the current
    /// state (`InvalidState`) or an invalid own codename. Handshake and
    /// per-message failures are reported through [`UiUpdate`]s instead.
    pub fn handle(&mut self, event: SessionEvent<E::Instant>) -> Result<Actions, SessionError> {
        match event {
            SessionEvent::Create { codename, channel_id } => self.create(codename, channel_id),
            SessionEvent::Join { codename, channel_id } => self.join(codename, channel_id),
            SessionEvent::Registered { peer_id } => Ok(self.on_registered(peer_id)),
            SessionEvent::RegistrationFailed { reason } => Ok(self.on_registration_failed(reason)),
            SessionEvent::RendezvousDisconnected => {
                Ok(transport(self.registry.on_rendezvous_disconnected()))
            },
            SessionEvent::ChannelOpened { peer_id, direction } => {
                Ok(self.on_channel_opened(&peer_id, direction))
            },
            SessionEvent::ConnectFailed { peer_id, failure } => {
                Ok(self.on_connect_failed(&peer_id, failure))
            },
            SessionEvent::ChannelClosed { peer_id } => Ok(self.on_channel_closed(&peer_id)),
            SessionEvent::MessageReceived { from, message } => Ok(self.on_message(&from, message)),
            SessionEvent::Tick { now } => Ok(self.on_tick(now)),
            SessionEvent::Input { line } => self.on_input(&line),
            SessionEvent::SendText { text } => self.send_text(&text),
            SessionEvent::SendFile { file_name, mime_type, data } => {
                self.send_file(&file_name, mime_type, &data)
            },
            SessionEvent::Leave => Ok(self.leave()),
            SessionEvent::ReturnToLanding => self.return_to_landing(),
        }
    }

    /// Current screen.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether this session created the channel.
    pub fn is_creator(&self) -> bool {
        self.is_creator
    }

    /// Entry flag (authoritative on the creator, mirrored elsewhere).
    pub fn entry_open(&self) -> bool {
        self.entry_open
    }

    /// Own codename. Empty on the landing screen.
    pub fn codename(&self) -> &str {
        &self.codename
    }

    /// Channel this session created or joined.
    pub fn channel_id(&self) -> Option<&ChannelId> {
        self.channel_id.as_ref()
    }

    /// Creator's derived rendezvous identifier.
    pub fn creator_id(&self) -> Option<&PeerId> {
        self.creator_id.as_ref()
    }

    /// Identifier we are registered at.
    pub fn own_peer_id(&self) -> Option<&PeerId> {
        self.registry.own_id()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Every known participant.
    pub fn participants(&self) -> &BTreeMap<PeerId, Participant> {
        &self.participants
    }

    /// One participant.
    pub fn participant(&self, peer_id: &PeerId) -> Option<&Participant> {
        self.participants.get(peer_id)
    }

    /// Participants with a completed direct handshake.
    pub fn connected_peer_count(&self) -> usize {
        self.participants.values().filter(|p| p.connected).count()
    }

    /// Own key fingerprint. `None` before keys exist and after purge.
    pub fn fingerprint(&self) -> Option<String> {
        self.keys.own_fingerprint()
    }

    /// Fingerprint of a peer's imported key.
    pub fn peer_fingerprint(&self, peer_id: &PeerId) -> Option<String> {
        self.keys.peer_fingerprint(peer_id)
    }

    /// Whether a key is held for the peer.
    pub fn has_peer_key(&self, peer_id: &PeerId) -> bool {
        self.keys.has_key(peer_id)
    }

    /// Number of imported peer keys.
    pub fn peer_key_count(&self) -> usize {
        self.keys.peer_count()
    }

    /// Whether our channel to a peer is open.
    pub fn is_channel_open(&self, peer_id: &PeerId) -> bool {
        self.registry.is_open(peer_id)
    }

    /// Peers with an open channel.
    pub fn open_channels(&self) -> Vec<PeerId> {
        self.registry.open_peers().cloned().collect()
    }

    /// Number of unanswered pings.
    pub fn pending_ping_count(&self) -> usize {
        self.pending_pings.len()
    }

    /// Time since the first completed key exchange.
    pub fn session_duration(&self, now: E::Instant) -> Option<Duration> {
        self.session_start.map(|start| now - start)
    }

    /// Membership view for the presentation layer.
    pub fn members(&self) -> Vec<MemberView> {
        self.participants
            .iter()
            .map(|(peer_id, p)| MemberView {
                peer_id: peer_id.clone(),
                codename: p.codename.clone(),
                connected: p.connected,
                fingerprint: self.keys.peer_fingerprint(peer_id),
            })
            .collect()
    }

    /// Remove a participant and its key.
    ///
    /// Idempotent: removing an unknown identifier changes nothing and returns
    /// no actions. On the creator, a removal is re-broadcast as `peer_left`.
    pub fn remove_participant(&mut self, peer_id: &PeerId) -> Actions {
        self.keys.remove_peer_key(peer_id);
        self.pending_pings.remove(peer_id);
        let Some(participant) = self.participants.remove(peer_id) else {
            return Vec::new();
        };

        tracing::info!(%peer_id, codename = %participant.codename, "participant left");
        let mut actions = vec![UiUpdate::system(format!("{} left", participant.codename)).into()];

        if self.is_creator {
            let announcement = WireMessage::PeerLeft { peer_id: peer_id.clone() };
            actions.extend(transport(self.registry.broadcast(&announcement, Some(peer_id))));
        }

        actions.push(self.membership());
        actions.extend(self.check_alone());
        actions
    }

    /// Remove a departed participant and close our direct channel to it.
    fn drop_peer(&mut self, peer_id: &PeerId) -> Actions {
        let mut actions = self.remove_participant(peer_id);
        self.key_sent.remove(peer_id);
        actions.extend(transport(self.registry.close_channel(peer_id)));
        actions
    }

    fn create(&mut self, codename: String, channel_id: ChannelId) -> Result<Actions, SessionError> {
        self.require(&[SessionState::Landing], "create a channel")?;
        validate_codename(&codename)?;

        if let Err(err) = self.generate_keypair() {
            return Ok(self.fail(err));
        }

        let creator_id = channel_id.creator_peer_id(&self.config.creator_id_prefix);
        tracing::info!(channel = %channel_id, %creator_id, "creating channel");

        self.codename = codename;
        self.is_creator = true;
        self.entry_open = true;
        self.creator_id = Some(creator_id.clone());
        self.channel_id = Some(channel_id);

        let mut actions = transport(self.registry.create_as_rendezvous(creator_id));
        actions.extend(self.transition(SessionState::Waiting));
        Ok(actions)
    }

    fn join(&mut self, codename: String, channel_id: ChannelId) -> Result<Actions, SessionError> {
        self.require(&[SessionState::Landing], "join a channel")?;
        validate_codename(&codename)?;

        if let Err(err) = self.generate_keypair() {
            return Ok(self.fail(err));
        }

        let creator_id = channel_id.creator_peer_id(&self.config.creator_id_prefix);
        tracing::info!(channel = %channel_id, %creator_id, "joining channel");

        self.codename = codename;
        self.is_creator = false;
        self.entry_open = true;
        self.creator_id = Some(creator_id.clone());
        self.channel_id = Some(channel_id);

        let now = self.env.now();
        let mut actions = transport(self.registry.join_as_rendezvous_client(creator_id, now));
        actions.extend(self.transition(SessionState::Waiting));
        Ok(actions)
    }

    fn on_registered(&mut self, peer_id: PeerId) -> Actions {
        if !self.is_active() {
            tracing::debug!(%peer_id, state = %self.state, "ignoring late registration");
            return Vec::new();
        }

        tracing::info!(%peer_id, "registered with rendezvous");
        let mut actions = transport(self.registry.on_registered(peer_id));

        if self.is_creator && self.state == SessionState::Waiting {
            if let Some(channel_id) = &self.channel_id {
                let text = format!("Channel ready. Share {}", channel_id.to_fragment());
                actions.push(UiUpdate::system(text).into());
            }
        }
        actions
    }

    fn on_registration_failed(&mut self, reason: String) -> Actions {
        self.registry.on_registration_failed();
        match self.state {
            SessionState::Waiting if self.is_creator => {
                self.fail(SessionError::RegistrationFailure { reason })
            },
            SessionState::Waiting => {
                self.fail(JoinError::Network { reason }.into())
            },
            SessionState::Chat => {
                tracing::warn!(%reason, "re-registration failed");
                let text = format!("Rendezvous unavailable ({reason}); newcomers cannot reach you");
                vec![UiUpdate::error(text).into()]
            },
            SessionState::Landing | SessionState::Destroyed | SessionState::Error => Vec::new(),
        }
    }

    fn on_channel_opened(&mut self, peer_id: &PeerId, direction: Direction) -> Actions {
        if !self.is_active() {
            return vec![TransportAction::Close { peer_id: peer_id.clone() }.into()];
        }

        match self.registry.on_channel_opened(peer_id, direction) {
            Admission::Refused(action) => vec![action.into()],
            Admission::Admitted => {
                tracing::debug!(%peer_id, ?direction, "channel open");
                self.send_key_exchange(peer_id).into_iter().collect()
            },
        }
    }

    fn on_connect_failed(&mut self, peer_id: &PeerId, failure: ConnectFailure) -> Actions {
        match self.registry.on_connect_failed(peer_id, failure) {
            Some(err) if self.state == SessionState::Waiting => self.fail(err.into()),
            Some(_) => Vec::new(),
            None => {
                tracing::debug!(%peer_id, "direct connection failed");
                self.drop_unreachable(peer_id)
            },
        }
    }

    /// Forget an announced participant whose direct channel never opened.
    fn drop_unreachable(&mut self, peer_id: &PeerId) -> Actions {
        if self.state != SessionState::Chat
            || !self.participants.get(peer_id).is_some_and(|p| !p.connected)
        {
            return Vec::new();
        }

        let name = self.display_name(peer_id);
        self.keys.remove_peer_key(peer_id);
        self.pending_pings.remove(peer_id);
        self.participants.remove(peer_id);
        self.key_sent.remove(peer_id);
        vec![UiUpdate::error(format!("Could not reach {name}")).into(), self.membership()]
    }

    fn on_channel_closed(&mut self, peer_id: &PeerId) -> Actions {
        self.key_sent.remove(peer_id);
        if let Some(err) = self.registry.on_channel_closed(peer_id) {
            if self.state == SessionState::Waiting {
                return self.fail(err.into());
            }
        }

        if self.state != SessionState::Chat {
            return Vec::new();
        }
        self.remove_participant(peer_id)
    }

    fn on_message(&mut self, from: &PeerId, message: WireMessage) -> Actions {
        if !self.is_active() {
            tracing::debug!(%from, kind = message.kind(), state = %self.state, "ignoring message");
            return Vec::new();
        }

        if message.requires_creator_authority() && self.creator_id.as_ref() != Some(from) {
            tracing::warn!(
                %from,
                kind = message.kind(),
                "ignoring creator-only message from non-creator"
            );
            return Vec::new();
        }

        tracing::debug!(%from, kind = message.kind(), "received");
        match message {
            WireMessage::KeyExchange { public_key, codename } => {
                self.on_key_exchange(from, public_key, codename)
            },
            WireMessage::PeerList { peers } => self.on_peer_list(peers),
            WireMessage::PeerJoined { peer_id, codename, public_key } => {
                let record = PeerRecord { peer_id, codename, public_key };
                let mut actions = self.record_announced(record, false);
                actions.push(self.membership());
                actions
            },
            WireMessage::PeerLeft { peer_id } => self.drop_peer(&peer_id),
            WireMessage::Leave => self.drop_peer(from),
            WireMessage::Chat { ciphertext } => self.on_chat(from, &ciphertext),
            WireMessage::File { ciphertext } => self.on_file(from, &ciphertext),
            WireMessage::Close => {
                tracing::info!("creator closed the channel");
                let now = self.env.now();
                let teardown = self
                    .teardown_requested
                    .get_or_insert(Teardown { at: now, cause: TeardownCause::CreatorClosed });
                teardown.cause = TeardownCause::CreatorClosed;
                vec![UiUpdate::system("The creator closed the channel").into()]
            },
            WireMessage::Clear => vec![UiUpdate::ClearMessages.into()],
            WireMessage::EntryClosed => {
                self.entry_open = false;
                vec![UiUpdate::system("Entry closed by the creator").into()]
            },
            WireMessage::EntryOpened => {
                self.entry_open = true;
                vec![UiUpdate::system("Entry opened by the creator").into()]
            },
            WireMessage::Ping { timestamp } => {
                transport(self.registry.send_to(from, WireMessage::Pong { timestamp }))
            },
            WireMessage::Pong { timestamp } => self.on_pong(from, timestamp),
            WireMessage::Unknown => Vec::new(),
        }
    }

    fn on_key_exchange(&mut self, from: &PeerId, public_key: String, codename: String) -> Actions {
        if let Err(err) = validate_handshake(&codename, &public_key)
            .and_then(|()| self.keys.import_peer_key(from, &public_key))
        {
            tracing::warn!(%from, %err, "rejected key exchange");
            let text = format!("Key exchange from {from} rejected: {err}");
            return vec![UiUpdate::error(text).into()];
        }

        let mut actions: Actions = self.send_key_exchange(from).into_iter().collect();
        let already_connected = self.participants.get(from).is_some_and(|p| p.connected);
        let participant = Participant {
            codename: codename.clone(),
            public_key: public_key.clone(),
            connected: true,
        };
        self.participants.insert(from.clone(), participant);

        if !already_connected {
            tracing::info!(peer_id = %from, %codename, "participant joined");
            actions.push(UiUpdate::system(format!("{codename} joined")).into());
            if self.is_creator {
                actions.extend(self.introduce(from, &codename, &public_key));
            }
        }

        actions.extend(self.complete_own_exchange(from));

        if !already_connected {
            if self.is_creator
                && self.config.admission == AdmissionPolicy::BurnAfterFirst
                && self.entry_open
            {
                actions.extend(self.burn_link());
            }
            actions.push(self.membership());
        }
        actions
    }

    /// Creator side of mesh bootstrap: tell the newcomer about everyone else,
    /// and everyone else about the newcomer.
    fn introduce(&self, newcomer: &PeerId, codename: &str, public_key: &str) -> Actions {
        let peers: Vec<PeerRecord> = self
            .participants
            .iter()
            .filter(|(peer_id, p)| *peer_id != newcomer && p.connected)
            .map(|(peer_id, p)| PeerRecord {
                peer_id: peer_id.clone(),
                codename: p.codename.clone(),
                public_key: p.public_key.clone(),
            })
            .collect();

        let mut actions =
            transport(self.registry.send_to(newcomer, WireMessage::PeerList { peers }));
        let joined = WireMessage::PeerJoined {
            peer_id: newcomer.clone(),
            codename: codename.to_string(),
            public_key: public_key.to_string(),
        };
        actions.extend(transport(self.registry.broadcast(&joined, Some(newcomer))));
        actions
    }

    fn complete_own_exchange(&mut self, from: &PeerId) -> Actions {
        if self.state != SessionState::Waiting {
            return Vec::new();
        }
        // Joiners complete only on the creator's reciprocal exchange.
        if !self.is_creator && !self.registry.complete_join(from) {
            return Vec::new();
        }

        tracing::info!(peer_id = %from, "handshake complete");
        self.session_start = Some(self.env.now());

        let mut actions = vec![UiUpdate::SetConnectionStatus(true).into()];
        actions.extend(self.transition(SessionState::Chat));
        actions
    }

    fn burn_link(&mut self) -> Actions {
        tracing::info!("first participant admitted, burning link");
        self.entry_open = false;

        let mut actions = transport(self.registry.close_entry());
        actions.extend(transport(self.registry.broadcast(&WireMessage::EntryClosed, None)));
        actions.push(UiUpdate::system("Link burned: no one else can join").into());
        actions
    }

    fn on_peer_list(&mut self, peers: Vec<PeerRecord>) -> Actions {
        let mut actions = Vec::new();
        for record in peers {
            actions.extend(self.record_announced(record, true));
        }
        actions.push(self.membership());
        actions
    }

    /// Record a creator-announced participant and pre-import its key.
    /// Idempotent under any interleaving with the peer's own `key_exchange`.
    fn record_announced(&mut self, record: PeerRecord, connect: bool) -> Actions {
        let PeerRecord { peer_id, codename, public_key } = record;
        if Some(&peer_id) == self.registry.own_id() {
            return Vec::new();
        }

        if let Err(err) = validate_handshake(&codename, &public_key) {
            tracing::warn!(%peer_id, %err, "ignoring malformed peer announcement");
            return Vec::new();
        }
        if !self.keys.has_key(&peer_id) {
            if let Err(err) = self.keys.import_peer_key(&peer_id, &public_key) {
                tracing::warn!(%peer_id, %err, "ignoring peer announcement with bad key");
                return Vec::new();
            }
        }

        self.participants
            .entry(peer_id.clone())
            .or_insert_with(|| Participant { codename, public_key, connected: false });

        if connect {
            transport(self.registry.connect_to(&peer_id))
        } else {
            Vec::new()
        }
    }

    fn on_chat(&self, from: &PeerId, ciphertext: &str) -> Actions {
        let sender = self.display_name(from);
        match EncryptionGateway::new(&self.keys).decrypt_from_peer(ciphertext, from) {
            Ok(decrypted) => {
                if !decrypted.verified {
                    tracing::warn!(%from, "chat signature did not verify");
                }
                vec![
                    UiUpdate::AppendMessage {
                        kind: MessageKind::Peer,
                        text: String::from_utf8_lossy(&decrypted.plaintext).into_owned(),
                        sender: Some(sender),
                        unverified: !decrypted.verified,
                    }
                    .into(),
                ]
            },
            Err(err) => {
                tracing::warn!(%from, %err, "chat decryption failed");
                let text = format!("Message from {sender} could not be decrypted: {err}");
                vec![UiUpdate::error(text).into()]
            },
        }
    }

    fn on_file(&self, from: &PeerId, ciphertext: &str) -> Actions {
        let sender = self.display_name(from);
        let received = EncryptionGateway::new(&self.keys)
            .decrypt_from_peer(ciphertext, from)
            .and_then(|decrypted| {
                let envelope = FileEnvelope::decode(&decrypted.plaintext).map_err(|e| {
                    SessionError::FileRejected { reason: format!("malformed file envelope: {e}") }
                })?;
                let data = envelope.validate(self.config.max_file_size)?;
                Ok(ReceivedFile {
                    sender: sender.clone(),
                    file_name: envelope.file_name,
                    mime_type: envelope.mime_type,
                    data,
                    unverified: !decrypted.verified,
                })
            });

        match received {
            Ok(file) => {
                tracing::info!(
                    %from,
                    file_name = %file.file_name,
                    size = file.data.len(),
                    "file received"
                );
                vec![UiUpdate::AppendFile(file).into()]
            },
            Err(err) => {
                tracing::warn!(%from, %err, "file rejected");
                vec![UiUpdate::error(format!("File from {sender} rejected: {err}")).into()]
            },
        }
    }

    fn on_pong(&mut self, from: &PeerId, timestamp: u64) -> Actions {
        match self.pending_pings.get(from) {
            Some(pending) if pending.timestamp == timestamp => {
                self.pending_pings.remove(from);
                let rtt = self.elapsed_ms().saturating_sub(timestamp);
                let text = format!("Pong from {}: {rtt} ms", self.display_name(from));
                vec![UiUpdate::system(text).into()]
            },
            _ => {
                tracing::trace!(%from, timestamp, "dropping unmatched pong");
                Vec::new()
            },
        }
    }

    fn on_tick(&mut self, now: E::Instant) -> Actions {
        if self.state == SessionState::Waiting && !self.is_creator {
            if let Some(err) = self.registry.check_join_timeout(now, self.config.join_timeout) {
                return self.fail(err.into());
            }
        }

        let ping_timeout = self.config.ping_timeout;
        self.pending_pings.retain(|peer_id, pending| {
            let live = now - pending.sent_at < ping_timeout;
            if !live {
                tracing::debug!(%peer_id, "ping expired");
            }
            live
        });

        let grace = self.config.teardown_grace;
        if self.teardown_requested.is_some_and(|t| now - t.at >= grace) {
            self.destroy("Channel closed")
        } else {
            Vec::new()
        }
    }

    fn on_input(&mut self, line: &str) -> Result<Actions, SessionError> {
        let line = line.trim();
        if !line.starts_with('/') {
            return self.send_text(line);
        }

        self.require(&[SessionState::Waiting, SessionState::Chat], "run a command")?;
        Ok(match parse_command(line) {
            Ok(command) => self.execute(command),
            Err(err) => vec![UiUpdate::error(err.to_string()).into()],
        })
    }

    fn execute(&mut self, command: Command) -> Actions {
        tracing::debug!(?command, "running command");
        match command {
            Command::Help => vec![UiUpdate::system(HELP_TEXT).into()],
            Command::Close if self.is_creator => {
                let mut actions = transport(self.registry.broadcast(&WireMessage::Close, None));
                actions.extend(self.destroy("You closed the channel"));
                actions
            },
            Command::Close => self.destroy("You left the channel"),
            Command::CloseEntry | Command::OpenEntry if !self.is_creator => {
                vec![UiUpdate::error("Only the channel creator can change entry").into()]
            },
            Command::CloseEntry if !self.entry_open => {
                vec![UiUpdate::system("Entry is already closed").into()]
            },
            Command::CloseEntry => {
                self.entry_open = false;
                let mut actions = transport(self.registry.close_entry());
                actions.extend(transport(self.registry.broadcast(&WireMessage::EntryClosed, None)));
                actions.push(UiUpdate::system("Entry closed. No one else can join").into());
                actions.extend(self.check_alone());
                actions
            },
            Command::OpenEntry if self.entry_open => {
                vec![UiUpdate::system("Entry is already open").into()]
            },
            Command::OpenEntry => {
                self.entry_open = true;
                let mut actions = transport(self.registry.open_entry());
                actions.extend(transport(self.registry.broadcast(&WireMessage::EntryOpened, None)));
                actions.push(UiUpdate::system("Entry opened").into());
                if self.teardown_requested.is_some_and(|t| t.cause == TeardownCause::Alone) {
                    tracing::info!("entry reopened, cancelling teardown");
                    self.teardown_requested = None;
                }
                actions
            },
            Command::Clear => {
                let mut actions = vec![UiUpdate::ClearMessages.into()];
                actions.extend(transport(self.registry.broadcast(&WireMessage::Clear, None)));
                actions
            },
            Command::Ping(target) => self.ping(target.as_deref()),
            Command::Fingerprint => {
                let mut lines = vec![format!(
                    "Your fingerprint: {}",
                    self.keys.own_fingerprint().unwrap_or_else(|| "unavailable".to_string())
                )];
                lines.extend(self.members().into_iter().map(|m| {
                    let fingerprint = m.fingerprint.unwrap_or_else(|| "unknown".to_string());
                    format!("{}: {fingerprint}", m.codename)
                }));
                vec![UiUpdate::system(lines.join("\n")).into()]
            },
            Command::Members => {
                let mut lines = vec![format!("{} (you)", self.codename)];
                lines.extend(self.participants.values().map(|p| {
                    if p.connected {
                        p.codename.clone()
                    } else {
                        format!("{} (connecting)", p.codename)
                    }
                }));
                let text = format!("Members ({}):\n{}", lines.len(), lines.join("\n"));
                vec![UiUpdate::system(text).into()]
            },
        }
    }

    fn ping(&mut self, target: Option<&str>) -> Actions {
        let targets: Vec<PeerId> = self
            .participants
            .iter()
            .filter(|(_, p)| p.connected)
            .filter(|(_, p)| target.is_none_or(|name| p.codename.eq_ignore_ascii_case(name)))
            .map(|(peer_id, _)| peer_id.clone())
            .collect();

        if targets.is_empty() {
            let text = match target {
                Some(name) => format!("No connected participant named {name}"),
                None => "No one to ping".to_string(),
            };
            return vec![UiUpdate::error(text).into()];
        }

        let timestamp = self.elapsed_ms();
        let sent_at = self.env.now();
        let mut actions = Vec::new();
        for peer_id in targets {
            if let Some(action) = self.registry.send_to(&peer_id, WireMessage::Ping { timestamp }) {
                self.pending_pings.insert(peer_id, PendingPing { timestamp, sent_at });
                actions.push(action.into());
            }
        }
        actions
    }

    fn send_text(&mut self, text: &str) -> Result<Actions, SessionError> {
        self.require(&[SessionState::Chat], "send a message")?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        match self.seal(text.as_bytes()) {
            Ok(ciphertext) => {
                let mut actions =
                    transport(self.registry.broadcast(&WireMessage::Chat { ciphertext }, None));
                actions.push(
                    UiUpdate::AppendMessage {
                        kind: MessageKind::Own,
                        text: text.to_string(),
                        sender: Some(self.codename.clone()),
                        unverified: false,
                    }
                    .into(),
                );
                Ok(actions)
            },
            Err(err) => {
                tracing::warn!(%err, "message not sent");
                Ok(vec![UiUpdate::error(format!("Message not sent: {err}")).into()])
            },
        }
    }

    fn send_file(
        &mut self,
        file_name: &str,
        mime_type: String,
        data: &[u8],
    ) -> Result<Actions, SessionError> {
        self.require(&[SessionState::Chat], "send a file")?;

        let sealed = FileEnvelope::check_outgoing(data.len(), self.config.max_file_size)
            .and_then(|()| FileEnvelope::new(file_name, mime_type, data).encode())
            .map_err(SessionError::from)
            .and_then(|plaintext| self.seal(&plaintext));

        match sealed {
            Ok(ciphertext) => {
                tracing::info!(%file_name, size = data.len(), "sending file");
                let mut actions =
                    transport(self.registry.broadcast(&WireMessage::File { ciphertext }, None));
                let text = format!("Sent {file_name} ({} bytes)", data.len());
                actions.push(UiUpdate::system(text).into());
                Ok(actions)
            },
            Err(err) => {
                tracing::warn!(%file_name, %err, "file not sent");
                Ok(vec![UiUpdate::error(format!("File not sent: {err}")).into()])
            },
        }
    }

    fn leave(&mut self) -> Actions {
        self.destroy("You left the channel")
    }

    fn return_to_landing(&mut self) -> Result<Actions, SessionError> {
        self.require(&[SessionState::Error, SessionState::Destroyed], "return to landing")?;

        self.codename.clear();
        self.channel_id = None;
        self.creator_id = None;
        self.is_creator = false;
        self.entry_open = true;
        self.keys = KeyStore::new();
        self.registry = ConnectionRegistry::new();
        self.participants.clear();
        self.pending_pings.clear();
        self.key_sent.clear();
        self.session_start = None;
        self.teardown_requested = None;

        Ok(self.transition(SessionState::Landing))
    }

    /// Local teardown: `leave` to every open channel, close channels, release
    /// the registration, purge keys.
    fn destroy(&mut self, reason: &str) -> Actions {
        if !self.is_active() {
            return Vec::new();
        }
        tracing::info!(reason, "destroying session");

        let mut actions = transport(self.registry.broadcast(&WireMessage::Leave, None));
        actions.extend(transport(self.registry.destroy()));
        self.purge();

        actions.push(UiUpdate::system(reason).into());
        actions.push(UiUpdate::SetConnectionStatus(false).into());
        actions.extend(self.transition(SessionState::Destroyed));
        actions
    }

    /// Fatal failure: release everything and show the error screen.
    fn fail(&mut self, err: SessionError) -> Actions {
        tracing::warn!(%err, "session failed");

        let mut actions = transport(self.registry.destroy());
        self.purge();

        let text = match &err {
            SessionError::RegistrationFailure { .. } => {
                format!("{err}. Return to the start screen to try again")
            },
            _ => err.to_string(),
        };
        actions.push(UiUpdate::error(text).into());
        actions.push(UiUpdate::SetConnectionStatus(false).into());
        actions.extend(self.transition(SessionState::Error));
        actions
    }

    fn purge(&mut self) {
        self.keys.purge();
        self.participants.clear();
        self.pending_pings.clear();
        self.key_sent.clear();
        self.teardown_requested = None;
    }

    /// Schedule teardown when nobody is left: always for joiners, and for the
    /// creator only once entry is closed.
    fn check_alone(&mut self) -> Actions {
        if self.state != SessionState::Chat
            || self.teardown_requested.is_some()
            || self.connected_peer_count() > 0
            || (self.is_creator && self.entry_open)
        {
            return Vec::new();
        }

        tracing::info!("no participants left, scheduling teardown");
        let at = self.env.now();
        self.teardown_requested = Some(Teardown { at, cause: TeardownCause::Alone });
        vec![UiUpdate::system("Everyone has left. Closing channel").into()]
    }

    fn send_key_exchange(&mut self, peer_id: &PeerId) -> Option<SessionAction> {
        if self.key_sent.contains(peer_id) {
            return None;
        }
        let public_key = self.keys.own_public_key()?;
        let message = WireMessage::KeyExchange { public_key, codename: self.codename.clone() };
        let action = self.registry.send_to(peer_id, message)?;

        self.key_sent.insert(peer_id.clone());
        Some(action.into())
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String, SessionError> {
        let mut seed = [0u8; SEAL_SEED_SIZE];
        self.env.random_bytes(&mut seed);
        EncryptionGateway::new(&self.keys).encrypt_for_all_peers(plaintext, seed)
    }

    fn generate_keypair(&mut self) -> Result<(), SessionError> {
        let mut seed = [0u8; KEYPAIR_SEED_SIZE];
        self.env.random_bytes(&mut seed);
        let result = self.keys.generate_own_keypair(&seed);
        seed.zeroize();
        result.map(|_| ())
    }

    fn membership(&self) -> SessionAction {
        UiUpdate::UpdateMembership { self_codename: self.codename.clone(), peers: self.members() }
            .into()
    }

    fn transition(&mut self, state: SessionState) -> Actions {
        tracing::debug!(from = %self.state, to = %state, "state transition");
        self.state = state;
        vec![UiUpdate::ShowScreen(state).into()]
    }

    fn require(&self, allowed: &[SessionState], operation: &str) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState { state: self.state, operation: operation.to_string() })
        }
    }

    fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Waiting | SessionState::Chat)
    }

    fn display_name(&self, peer_id: &PeerId) -> String {
        self.participants.get(peer_id).map_or_else(|| peer_id.to_string(), |p| p.codename.clone())
    }

    fn elapsed_ms(&self) -> u64 {
        (self.env.now() - self.origin).as_millis() as u64
    }
}

fn validate_handshake(codename: &str, public_key: &str) -> Result<(), SessionError> {
    validate_codename(codename)?;
    if !is_armored_public_key(public_key) {
        return Err(SessionError::InvalidKeyFormat {
            reason: "not an armored public key block".to_string(),
        });
    }
    Ok(())
}

fn transport(actions: impl IntoIterator<Item = TransportAction>) -> Actions {
    actions.into_iter().map(SessionAction::Transport).collect()
}
