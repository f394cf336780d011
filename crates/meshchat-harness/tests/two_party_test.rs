//! Two-party channel lifecycle over the simulated network.

use std::time::Duration;

use meshchat_core::{MessageKind, SessionState, UiUpdate};
use meshchat_harness::{InvariantRegistry, SimNetwork};
use meshchat_proto::{ChannelId, PeerId};

const CHANNEL: &str = "bold-echo-fern-grid";

fn channel() -> ChannelId {
    ChannelId::parse(CHANNEL).expect("valid word code")
}

/// Creator in tab 0, joiner in tab 1, both in chat.
fn two_party(seed: u64) -> SimNetwork {
    let mut net = SimNetwork::new(seed).with_invariants(InvariantRegistry::standard());
    let creator = net.open_tab();
    let joiner = net.open_tab();

    net.create(creator, "Quiet Heron", &channel()).expect("create");
    net.join(joiner, "Amber Fox", &channel()).expect("join");
    net
}

#[test]
fn creator_registers_at_derived_identifier() {
    let mut net = SimNetwork::new(1);
    let creator = net.open_tab();
    net.create(creator, "Quiet Heron", &channel()).expect("create");

    assert_eq!(net.session(creator).state(), SessionState::Waiting);
    assert_eq!(net.registered(&PeerId::new(format!("meshchat-{CHANNEL}"))), Some(creator));
    let system = net.lines(creator, MessageKind::System);
    assert!(system.contains(&"Channel ready. Share #bold-echo-fern-grid"));
    assert!(net.session(creator).fingerprint().is_some());
}

#[test]
fn both_sides_reach_chat_after_key_exchange() {
    let net = two_party(2);

    for tab in [0, 1] {
        let session = net.session(tab);
        assert_eq!(session.state(), SessionState::Chat);
        assert_eq!(session.connected_peer_count(), 1);
        assert!(net.ui(tab).contains(&UiUpdate::SetConnectionStatus(true)));
    }
    assert!(net.session(0).is_creator());
    assert!(!net.session(1).is_creator());
    assert!(net.lines(0, MessageKind::System).contains(&"Amber Fox joined"));
    assert!(net.lines(1, MessageKind::System).contains(&"Quiet Heron joined"));
}

#[test]
fn fingerprints_agree_across_the_channel() {
    let net = two_party(3);
    let creator_id = net.identity(0).expect("creator registered").clone();
    let joiner_id = net.identity(1).expect("joiner registered").clone();

    assert_eq!(net.session(1).peer_fingerprint(&creator_id), net.session(0).fingerprint());
    assert_eq!(net.session(0).peer_fingerprint(&joiner_id), net.session(1).fingerprint());
}

#[test]
fn hello_arrives_verified() {
    let mut net = two_party(4);
    net.input(0, "hello").expect("send");

    let received = net.ui(1).iter().any(|update| {
        *update
            == UiUpdate::AppendMessage {
                kind: MessageKind::Peer,
                text: "hello".to_string(),
                sender: Some("Quiet Heron".to_string()),
                unverified: false,
            }
    });
    assert!(received, "joiner did not render a verified hello");
    assert_eq!(net.lines(0, MessageKind::Own), vec!["hello"]);
}

#[test]
fn creator_close_destroys_both_within_grace() {
    let mut net = two_party(5);
    net.input(0, "/close").expect("close");

    assert_eq!(net.session(0).state(), SessionState::Destroyed);
    assert!(net.session(0).fingerprint().is_none());
    assert_eq!(net.session(1).state(), SessionState::Chat);
    assert!(net.lines(1, MessageKind::System).contains(&"The creator closed the channel"));

    net.run_for(Duration::from_secs(2));

    assert_eq!(net.session(1).state(), SessionState::Destroyed);
    assert!(net.session(1).fingerprint().is_none());
    assert_eq!(net.session(1).peer_key_count(), 0);
}

#[test]
fn joiner_leaving_leaves_creator_waiting_for_others() {
    let mut net = two_party(6);
    net.leave(1);

    assert_eq!(net.session(1).state(), SessionState::Destroyed);
    assert!(net.lines(0, MessageKind::System).contains(&"Amber Fox left"));

    // Entry is still open, so the creator stays for newcomers.
    net.run_for(Duration::from_secs(3));
    assert_eq!(net.session(0).state(), SessionState::Chat);
    assert_eq!(net.session(0).connected_peer_count(), 0);
}

#[test]
fn creator_alone_with_entry_closed_self_destructs() {
    let mut net = two_party(7);
    net.input(0, "/close_entry").expect("close entry");
    assert!(net.lines(1, MessageKind::System).contains(&"Entry closed by the creator"));
    assert!(!net.session(1).entry_open());

    net.leave(1);
    assert_eq!(net.session(0).state(), SessionState::Chat);

    net.run_for(Duration::from_secs(2));
    assert_eq!(net.session(0).state(), SessionState::Destroyed);
}

#[test]
fn reopening_entry_keeps_a_lone_creator_alive() {
    let mut net = two_party(15);
    net.input(0, "/close_entry").expect("close entry");
    net.leave(1);
    assert!(net.lines(0, MessageKind::System).contains(&"Everyone has left. Closing channel"));

    net.input(0, "/open_entry").expect("open entry");
    net.run_for(Duration::from_secs(2));
    assert_eq!(net.session(0).state(), SessionState::Chat);
    assert!(net.session(0).entry_open());

    let late = net.open_tab();
    net.join(late, "Slate Owl", &channel()).expect("join");
    assert_eq!(net.session(late).state(), SessionState::Chat);
    assert_eq!(net.session(0).connected_peer_count(), 1);
}

#[test]
fn joiner_alone_self_destructs() {
    let mut net = two_party(8);
    net.leave(0);

    assert_eq!(net.session(0).state(), SessionState::Destroyed);
    assert!(net.lines(1, MessageKind::System).contains(&"Quiet Heron left"));

    net.run_for(Duration::from_secs(2));
    assert_eq!(net.session(1).state(), SessionState::Destroyed);
}

#[test]
fn ping_reports_round_trip() {
    let mut net = two_party(9);
    net.input(1, "/ping quiet heron").expect("ping");

    let system = net.lines(1, MessageKind::System);
    assert!(
        system.iter().any(|line| line.starts_with("Pong from Quiet Heron:")),
        "no pong rendered"
    );
    assert_eq!(net.session(1).pending_ping_count(), 0);
}

#[test]
fn clear_propagates() {
    let mut net = two_party(10);
    net.input(0, "before").expect("send");
    net.input(1, "/clear").expect("clear");

    assert!(net.ui(0).contains(&UiUpdate::ClearMessages));
    assert!(net.ui(1).contains(&UiUpdate::ClearMessages));
}

#[test]
fn return_to_landing_allows_a_fresh_channel() {
    let mut net = two_party(11);
    let first = net.session(1).fingerprint();
    net.input(0, "/close").expect("close");
    net.run_for(Duration::from_secs(2));

    net.intent(0, meshchat_core::SessionEvent::ReturnToLanding).expect("landing");
    net.intent(1, meshchat_core::SessionEvent::ReturnToLanding).expect("landing");
    assert_eq!(net.session(1).state(), SessionState::Landing);

    net.create(0, "Quiet Heron", &channel()).expect("recreate");
    net.join(1, "Amber Fox", &channel()).expect("rejoin");

    assert_eq!(net.session(1).state(), SessionState::Chat);
    assert_ne!(net.session(1).fingerprint(), first, "keypair must be fresh");
}
