//! Session events and actions.

use meshchat_proto::{ChannelId, PeerId, WireMessage};

use crate::session::SessionState;

/// Which side opened a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// A remote participant connected to us.
    Inbound,
    /// We connected to a remote participant.
    Outbound,
}

/// Why an outbound connection attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    /// Target identifier is not registered with the rendezvous.
    PeerUnavailable,
    /// Any other transport error.
    Network(String),
}

/// Events the caller feeds into the session.
///
/// The caller is responsible for:
/// - Forwarding transport notifications (registration, channel lifecycle)
/// - Delivering decoded wire messages, tagged with the sending channel
/// - Driving time forward via ticks
/// - Forwarding user intents
///
/// Generic over `I` (Instant type) to support both production and simulation
/// clocks.
#[derive(Debug, Clone)]
pub enum SessionEvent<I = std::time::Instant> {
    /// User creates a new channel.
    Create {
        /// Own display codename.
        codename: String,
        /// Channel to create.
        channel_id: ChannelId,
    },

    /// User joins an existing channel.
    Join {
        /// Own display codename.
        codename: String,
        /// Channel to join.
        channel_id: ChannelId,
    },

    /// Rendezvous acknowledged our registration.
    Registered {
        /// Identifier we are reachable at.
        peer_id: PeerId,
    },

    /// Rendezvous refused our registration.
    RegistrationFailed {
        /// Reason reported by the rendezvous.
        reason: String,
    },

    /// Lost the connection to the rendezvous (open channels unaffected).
    RendezvousDisconnected,

    /// A channel to a peer is open.
    ChannelOpened {
        /// Remote participant.
        peer_id: PeerId,
        /// Who initiated the channel.
        direction: Direction,
    },

    /// An outbound connection attempt failed.
    ConnectFailed {
        /// Target of the attempt.
        peer_id: PeerId,
        /// Failure kind.
        failure: ConnectFailure,
    },

    /// A channel closed or errored.
    ChannelClosed {
        /// Remote participant.
        peer_id: PeerId,
    },

    /// A wire message arrived on the channel to `from`.
    MessageReceived {
        /// Sending participant (transport identity of the channel).
        from: PeerId,
        /// Decoded message.
        message: WireMessage,
    },

    /// Time tick for timeout processing.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Raw line typed by the user: a `/command` or chat text.
    Input {
        /// The typed line.
        line: String,
    },

    /// User sends a chat message.
    SendText {
        /// Message text.
        text: String,
    },

    /// User sends a file.
    SendFile {
        /// Original file name.
        file_name: String,
        /// MIME type.
        mime_type: String,
        /// Raw content.
        data: Vec<u8>,
    },

    /// Tab closed or user left.
    Leave,

    /// User acknowledged an error or a destroyed session.
    ReturnToLanding,
}

/// Instructions for the rendezvous and channel transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportAction {
    /// Register with the rendezvous. `None` asks for an assigned identifier.
    Register {
        /// Requested identifier.
        peer_id: Option<PeerId>,
    },
    /// Release the rendezvous registration. Open channels stay up.
    Unregister,
    /// Open a channel to a registered peer.
    Connect {
        /// Target identifier.
        peer_id: PeerId,
    },
    /// Send a message on the open channel to `to`.
    Send {
        /// Recipient.
        to: PeerId,
        /// Message to deliver.
        message: WireMessage,
    },
    /// Close the channel to a peer.
    Close {
        /// Remote participant.
        peer_id: PeerId,
    },
}

/// Display category of a rendered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Text we sent.
    Own,
    /// Text a peer sent.
    Peer,
    /// Informational notice.
    System,
    /// Local failure notice.
    Error,
}

/// A validated incoming file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Sender's codename.
    pub sender: String,
    /// File name.
    pub file_name: String,
    /// MIME type reported by the sender.
    pub mime_type: String,
    /// Decoded content.
    pub data: Vec<u8>,
    /// Signature did not verify.
    pub unverified: bool,
}

/// One row of the membership view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberView {
    /// Rendezvous identifier.
    pub peer_id: PeerId,
    /// Display codename.
    pub codename: String,
    /// Whether a direct channel is established.
    pub connected: bool,
    /// Fingerprint of the imported key.
    pub fingerprint: Option<String>,
}

/// Instructions for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    /// Render a line.
    AppendMessage {
        /// Category.
        kind: MessageKind,
        /// Text.
        text: String,
        /// Sender codename for peer lines.
        sender: Option<String>,
        /// Show a tamper warning.
        unverified: bool,
    },
    /// Render a received file.
    AppendFile(ReceivedFile),
    /// Clear the message display.
    ClearMessages,
    /// Replace the membership view.
    UpdateMembership {
        /// Own codename.
        self_codename: String,
        /// Every known participant.
        peers: Vec<MemberView>,
    },
    /// Connected indicator.
    SetConnectionStatus(bool),
    /// Switch screens.
    ShowScreen(SessionState),
}

/// Actions the session produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Transport instruction.
    Transport(TransportAction),
    /// Presentation instruction.
    Ui(UiUpdate),
}

impl From<TransportAction> for SessionAction {
    fn from(action: TransportAction) -> Self {
        Self::Transport(action)
    }
}

impl From<UiUpdate> for SessionAction {
    fn from(update: UiUpdate) -> Self {
        Self::Ui(update)
    }
}

impl UiUpdate {
    /// Informational line.
    pub fn system(text: impl Into<String>) -> Self {
        Self::line(MessageKind::System, text.into())
    }

    /// Local failure line.
    pub fn error(text: impl Into<String>) -> Self {
        Self::line(MessageKind::Error, text.into())
    }

    fn line(kind: MessageKind, text: String) -> Self {
        Self::AppendMessage { kind, text, sender: None, unverified: false }
    }
}
