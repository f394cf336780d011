//! Mesh formation, creator authority and idempotent membership.

use std::time::Duration;

use meshchat_core::{AdmissionPolicy, MessageKind, SessionConfig, SessionState, UiUpdate};
use meshchat_harness::{FullMesh, Invariant, InvariantRegistry, SimNetwork};
use meshchat_proto::{ChannelId, PeerId, PeerRecord, WireMessage};

const CREATOR: usize = 0;
const B: usize = 1;
const C: usize = 2;

fn channel() -> ChannelId {
    ChannelId::parse("tidy-moss-lark-dune").expect("valid word code")
}

fn mesh_of_three(seed: u64) -> SimNetwork {
    let mut net = SimNetwork::new(seed).with_invariants(InvariantRegistry::standard());
    for _ in 0..3 {
        net.open_tab();
    }
    net.create(CREATOR, "Quiet Heron", &channel()).expect("create");
    net.join(B, "Amber Fox", &channel()).expect("join b");
    net.join(C, "Slate Owl", &channel()).expect("join c");
    net
}

fn count(lines: &[&str], needle: &str) -> usize {
    lines.iter().filter(|line| **line == needle).count()
}

#[test]
fn third_participant_connects_directly_to_second() {
    let net = mesh_of_three(1);
    let b_id = net.identity(B).expect("b registered").clone();
    let c_id = net.identity(C).expect("c registered").clone();

    assert!(net.linked(B, C), "no direct channel between joiners");
    assert!(net.session(C).is_channel_open(&b_id));
    assert!(net.session(B).is_channel_open(&c_id));
    for tab in [CREATOR, B, C] {
        assert_eq!(net.session(tab).state(), SessionState::Chat);
        assert_eq!(net.session(tab).connected_peer_count(), 2);
    }
    assert!(FullMesh.check(&net.snapshot()).is_ok());
}

#[test]
fn messages_reach_every_participant_verified() {
    let mut net = mesh_of_three(2);
    net.input(C, "hi all").expect("send");

    for tab in [CREATOR, B] {
        let got = net.ui(tab).iter().any(|update| {
            *update
                == UiUpdate::AppendMessage {
                    kind: MessageKind::Peer,
                    text: "hi all".to_string(),
                    sender: Some("Slate Owl".to_string()),
                    unverified: false,
                }
        });
        assert!(got, "tab {tab} missed the message");
    }
}

#[test]
fn members_lists_everyone() {
    let mut net = mesh_of_three(3);
    net.input(B, "/members").expect("members");

    let lines = net.lines(B, MessageKind::System);
    let listing = lines.iter().find(|line| line.starts_with("Members (3):")).expect("listing");
    assert!(listing.contains("Amber Fox (you)"));
    assert!(listing.contains("Quiet Heron"));
    assert!(listing.contains("Slate Owl"));
    assert!(!listing.contains("connecting"));
}

#[test]
fn leave_is_announced_once() {
    let mut net = mesh_of_three(4);
    net.leave(B);

    // C hears `leave` from B directly and `peer_left` from the creator.
    assert_eq!(count(&net.lines(C, MessageKind::System), "Amber Fox left"), 1);
    assert_eq!(count(&net.lines(CREATOR, MessageKind::System), "Amber Fox left"), 1);
    assert_eq!(net.session(C).connected_peer_count(), 1);
    assert_eq!(net.session(C).peer_key_count(), 1);
}

#[test]
fn duplicate_key_exchange_is_not_reannounced() {
    let mut net = mesh_of_three(5);
    let handshakes: Vec<_> = net
        .sent()
        .iter()
        .filter(|frame| matches!(frame.message, WireMessage::KeyExchange { .. }))
        .cloned()
        .collect();
    assert_eq!(handshakes.len(), 6, "one key_exchange per direction per channel");

    for frame in &handshakes {
        assert!(net.redeliver(frame));
    }
    net.run_until_idle();

    assert_eq!(count(&net.lines(CREATOR, MessageKind::System), "Amber Fox joined"), 1);
    assert_eq!(count(&net.lines(B, MessageKind::System), "Slate Owl joined"), 1);
    assert_eq!(count(&net.lines(C, MessageKind::System), "Amber Fox joined"), 1);
    let key_exchanges = net
        .sent()
        .iter()
        .filter(|frame| matches!(frame.message, WireMessage::KeyExchange { .. }))
        .count();
    assert_eq!(key_exchanges, 12, "replies must not be sent again");
}

#[test]
fn duplicate_announcements_are_idempotent() {
    let mut net = mesh_of_three(6);
    let announcements: Vec<_> = net
        .sent()
        .iter()
        .filter(|frame| {
            matches!(frame.message, WireMessage::PeerJoined { .. } | WireMessage::PeerList { .. })
        })
        .cloned()
        .collect();
    let before = net.session(C).members();

    for frame in &announcements {
        assert!(net.redeliver(frame));
    }
    net.run_until_idle();

    assert_eq!(net.session(C).members(), before);
    assert_eq!(net.session(B).connected_peer_count(), 2);
    assert!(FullMesh.check(&net.snapshot()).is_ok());
}

#[test]
fn creator_only_messages_from_others_are_ignored() {
    let mut net = mesh_of_three(7);
    let b_id = net.identity(B).expect("b registered").clone();
    let creator_id = net.identity(CREATOR).expect("creator registered").clone();

    net.inject(C, &b_id, WireMessage::Close);
    net.inject(C, &b_id, WireMessage::EntryClosed);
    net.inject(C, &b_id, WireMessage::PeerLeft { peer_id: creator_id });
    net.run_for(Duration::from_secs(2));

    let session = net.session(C);
    assert_eq!(session.state(), SessionState::Chat);
    assert!(session.entry_open());
    assert_eq!(session.connected_peer_count(), 2);
}

#[test]
fn joiners_cannot_change_entry() {
    let mut net = mesh_of_three(8);
    net.input(B, "/close_entry").expect("command runs");

    let errors = net.lines(B, MessageKind::Error);
    assert!(errors.contains(&"Only the channel creator can change entry"));
    assert!(net.session(CREATOR).entry_open());
    assert!(net.session(C).entry_open());
}

#[test]
fn closed_entry_turns_newcomers_away_until_reopened() {
    let mut net = mesh_of_three(9);
    let late = net.open_tab();

    net.input(CREATOR, "/close_entry").expect("close entry");
    net.join(late, "Rust Wren", &channel()).expect("join");
    assert_eq!(net.session(late).state(), SessionState::Error);
    let errors = net.lines(late, MessageKind::Error);
    assert!(errors.iter().any(|line| line.contains("channel inactive")));

    net.input(CREATOR, "/open_entry").expect("open entry");
    assert!(net.lines(B, MessageKind::System).contains(&"Entry opened by the creator"));

    net.intent(late, meshchat_core::SessionEvent::ReturnToLanding).expect("landing");
    net.join(late, "Rust Wren", &channel()).expect("join again");
    assert_eq!(net.session(late).state(), SessionState::Chat);
    assert_eq!(net.session(late).connected_peer_count(), 3);
    assert!(FullMesh.check(&net.snapshot()).is_ok());
}

#[test]
fn link_burning_admits_only_the_first_joiner() {
    let mut net = SimNetwork::new(10).with_invariants(InvariantRegistry::standard());
    let creator = net.open_tab_with(SessionConfig {
        admission: AdmissionPolicy::BurnAfterFirst,
        ..SessionConfig::default()
    });
    let first = net.open_tab();
    let second = net.open_tab();

    net.create(creator, "Quiet Heron", &channel()).expect("create");
    net.join(first, "Amber Fox", &channel()).expect("join");
    assert_eq!(net.session(first).state(), SessionState::Chat);
    assert!(!net.session(creator).entry_open());
    assert!(!net.session(first).entry_open());

    net.join(second, "Slate Owl", &channel()).expect("join");
    assert_eq!(net.session(second).state(), SessionState::Error);
}

#[test]
fn creator_rendezvous_reconnect_follows_entry() {
    let mut net = mesh_of_three(11);
    let creator_id = net.identity(CREATOR).expect("creator registered").clone();

    net.disconnect_rendezvous(CREATOR);
    assert_eq!(net.registered(&creator_id), Some(CREATOR), "open entry re-registers");
    assert_eq!(net.session(CREATOR).connected_peer_count(), 2);

    net.input(CREATOR, "/close_entry").expect("close entry");
    net.disconnect_rendezvous(CREATOR);
    assert_eq!(net.registered(&creator_id), None, "closed entry stays unregistered");
    assert_eq!(net.session(CREATOR).state(), SessionState::Chat);
}

#[test]
fn severed_channel_drops_participant_silently() {
    let mut net = mesh_of_three(12);
    net.sever(B, C);

    assert_eq!(net.session(B).connected_peer_count(), 1);
    assert_eq!(net.session(C).connected_peer_count(), 1);

    net.input(C, "after split").expect("send");
    assert!(net.lines(CREATOR, MessageKind::Peer).contains(&"after split"));
    assert!(!net.lines(B, MessageKind::Peer).contains(&"after split"));
    assert!(net.lines(C, MessageKind::Error).is_empty());
    assert!(net.rejected(C).is_empty());
}

#[test]
fn relayed_departure_closes_the_direct_channel() {
    let mut net = mesh_of_three(13);
    let c_id = net.identity(C).expect("c registered").clone();

    net.sever(CREATOR, C);

    assert!(!net.linked(B, C), "joiner kept its channel to a departed peer");
    assert!(!net.session(B).is_channel_open(&c_id));
    assert!(net.session(B).participant(&c_id).is_none());
    assert!(!net.session(B).has_peer_key(&c_id));
    assert_eq!(net.session(B).connected_peer_count(), 1);
    assert_eq!(count(&net.lines(B, MessageKind::System), "Slate Owl left"), 1);

    net.run_for(Duration::from_secs(2));
    assert_eq!(net.session(C).state(), SessionState::Destroyed);
    assert_eq!(net.session(B).state(), SessionState::Chat);
}

#[test]
fn unreachable_announced_peer_is_forgotten() {
    let mut net = mesh_of_three(14);
    let creator_id = net.identity(CREATOR).expect("creator registered").clone();
    let b_id = net.identity(B).expect("b registered").clone();
    let public_key = net.session(CREATOR).participant(&b_id).expect("b known").public_key.clone();
    let ghost = PeerId::new("peer-ghost");

    let record =
        PeerRecord { peer_id: ghost.clone(), codename: "Ghost Wren".to_string(), public_key };
    net.inject(C, &creator_id, WireMessage::PeerList { peers: vec![record] });

    assert!(net.session(C).participant(&ghost).is_none());
    assert!(!net.session(C).has_peer_key(&ghost));
    assert!(!net.session(C).is_channel_open(&ghost));
    assert!(net.lines(C, MessageKind::Error).contains(&"Could not reach Ghost Wren"));
    assert_eq!(net.session(C).connected_peer_count(), 2);
    assert_eq!(net.session(C).participants().len(), 2);
}
