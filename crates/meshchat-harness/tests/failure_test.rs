//! Join failures, registration conflicts and hostile payloads.

use std::time::Duration;

use meshchat_core::{MessageKind, SessionError, SessionEvent, SessionState, UiUpdate};
use meshchat_harness::{InvariantRegistry, SimNetwork, TICK_INTERVAL};
use meshchat_proto::{ChannelId, WireMessage};

fn channel() -> ChannelId {
    ChannelId::parse("calm-reed-vast-ember").expect("valid word code")
}

fn network(seed: u64) -> SimNetwork {
    SimNetwork::new(seed).with_invariants(InvariantRegistry::standard())
}

#[test]
fn join_without_creator_is_unavailable() {
    let mut net = network(1);
    let joiner = net.open_tab();
    net.join(joiner, "Amber Fox", &channel()).expect("join");

    assert_eq!(net.session(joiner).state(), SessionState::Error);
    assert!(net.ui(joiner).contains(&UiUpdate::ShowScreen(SessionState::Error)));
    let errors = net.lines(joiner, MessageKind::Error);
    assert!(
        errors.iter().any(|line| line.starts_with("channel inactive")),
        "expected an unavailable error"
    );
    assert!(net.session(joiner).fingerprint().is_none());
    assert!(
        net.identity(joiner).is_some_and(|id| net.registered(id).is_none()),
        "registration released"
    );
}

#[test]
fn unresponsive_creator_times_out_at_deadline() {
    let mut net = network(2);
    let creator = net.open_tab();
    let joiner = net.open_tab();
    net.create(creator, "Quiet Heron", &channel()).expect("create");
    net.mute(creator);

    net.join(joiner, "Amber Fox", &channel()).expect("join");
    assert_eq!(net.session(joiner).state(), SessionState::Waiting);

    net.run_for(Duration::from_secs(20) - TICK_INTERVAL);
    assert_eq!(net.session(joiner).state(), SessionState::Waiting);

    net.advance(TICK_INTERVAL);
    assert_eq!(net.session(joiner).state(), SessionState::Error);
    assert!(net.lines(joiner, MessageKind::Error).iter().any(|line| line.contains("timed out")));
}

#[test]
fn second_creator_of_a_channel_fails_registration() {
    let mut net = network(3);
    let first = net.open_tab();
    let second = net.open_tab();

    net.create(first, "Quiet Heron", &channel()).expect("create");
    net.create(second, "Amber Fox", &channel()).expect("create");

    assert_eq!(net.session(first).state(), SessionState::Waiting);
    assert_eq!(net.session(second).state(), SessionState::Error);
    assert!(
        net.lines(second, MessageKind::Error)
            .iter()
            .any(|line| line.starts_with("registration failed") && line.ends_with("try again")),
        "expected a registration failure"
    );

    net.intent(second, SessionEvent::ReturnToLanding).expect("landing");
    assert_eq!(net.session(second).state(), SessionState::Landing);
}

#[test]
fn invalid_codename_is_rejected_on_landing() {
    let mut net = network(4);
    let tab = net.open_tab();
    let err = net.create(tab, "   ", &channel()).unwrap_err();

    assert!(matches!(err, SessionError::InvalidCodename { .. }));
    assert_eq!(net.session(tab).state(), SessionState::Landing);
}

#[test]
fn intents_in_the_wrong_state_are_refused() {
    let mut net = network(5);
    let tab = net.open_tab();

    assert!(matches!(
        net.input(tab, "hello"),
        Err(SessionError::InvalidState { state: SessionState::Landing, .. })
    ));
    assert!(matches!(
        net.intent(tab, SessionEvent::ReturnToLanding),
        Err(SessionError::InvalidState { .. })
    ));

    net.create(tab, "Quiet Heron", &channel()).expect("create");
    assert!(matches!(
        net.create(tab, "Quiet Heron", &channel()),
        Err(SessionError::InvalidState { .. })
    ));
    assert!(matches!(net.input(tab, "too early"), Err(SessionError::InvalidState { .. })));
}

/// Creator, Amber Fox and Slate Owl in a mesh.
fn mesh(seed: u64) -> SimNetwork {
    let mut net = network(seed);
    for _ in 0..3 {
        net.open_tab();
    }
    net.create(0, "Quiet Heron", &channel()).expect("create");
    net.join(1, "Amber Fox", &channel()).expect("join");
    net.join(2, "Slate Owl", &channel()).expect("join");
    net
}

#[test]
fn misattributed_message_is_shown_unverified() {
    let mut net = mesh(6);
    net.input(2, "psst").expect("send");

    let to_b = net
        .sent()
        .iter()
        .find(|frame| {
            frame.from_tab == 2
                && frame.to_tab == 1
                && matches!(frame.message, WireMessage::Chat { .. })
        })
        .cloned()
        .expect("chat frame");
    let creator_id = net.identity(0).expect("creator").clone();
    net.inject(1, &creator_id, to_b.message);

    let flagged = net.ui(1).iter().any(|update| {
        *update
            == UiUpdate::AppendMessage {
                kind: MessageKind::Peer,
                text: "psst".to_string(),
                sender: Some("Quiet Heron".to_string()),
                unverified: true,
            }
    });
    assert!(flagged, "forged attribution must be flagged, not dropped");
    assert_eq!(net.session(1).state(), SessionState::Chat);
}

#[test]
fn undecryptable_message_is_reported_and_session_continues() {
    let mut net = mesh(7);
    let c_id = net.identity(2).expect("c").clone();

    let garbage = "bm90IGEgc2VhbGVkIG1lc3NhZ2U=".to_string();
    net.inject(1, &c_id, WireMessage::Chat { ciphertext: garbage });
    net.inject(1, &c_id, WireMessage::File { ciphertext: "%%%".to_string() });

    let errors = net.lines(1, MessageKind::Error);
    assert!(
        errors.iter().any(|line| line.starts_with("Message from Slate Owl could not be decrypted"))
    );
    assert!(errors.iter().any(|line| line.starts_with("File from Slate Owl rejected")));
    assert_eq!(net.session(1).state(), SessionState::Chat);

    net.input(2, "still fine").expect("send");
    assert!(net.lines(1, MessageKind::Peer).contains(&"still fine"));
}

#[test]
fn malformed_handshake_is_reported_without_teardown() {
    let mut net = mesh(8);
    let c_id = net.identity(2).expect("c").clone();

    net.inject(
        1,
        &c_id,
        WireMessage::KeyExchange {
            public_key: "not a key".to_string(),
            codename: "Slate Owl".to_string(),
        },
    );

    let errors = net.lines(1, MessageKind::Error);
    assert!(errors.iter().any(|line| line.starts_with("Key exchange from")));
    assert_eq!(net.session(1).state(), SessionState::Chat);
    assert_eq!(net.session(1).connected_peer_count(), 2);
}

#[test]
fn unknown_message_kinds_are_ignored() {
    let mut net = mesh(9);
    let c_id = net.identity(2).expect("c").clone();
    let before = net.ui(1).len();

    net.inject(1, &c_id, WireMessage::Unknown);
    assert_eq!(net.ui(1).len(), before);
}

#[test]
fn late_pong_is_ignored_after_expiry() {
    let mut net = mesh(10);
    let creator = net.identity(0).expect("creator").clone();
    net.mute(0);

    net.input(1, "/ping Quiet Heron").expect("ping");
    assert_eq!(net.session(1).pending_ping_count(), 1);

    net.run_for(Duration::from_secs(11));
    assert_eq!(net.session(1).pending_ping_count(), 0);

    net.inject(1, &creator, WireMessage::Pong { timestamp: 0 });
    assert!(!net.lines(1, MessageKind::System).iter().any(|line| line.starts_with("Pong from")));
}
