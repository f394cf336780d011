//! Property-based tests for the command dispatcher, key store and registry.

use std::time::Duration;

use meshchat_core::{
    CommandError, ConnectionRegistry, Direction, KeyStore, TransportAction, parse_command,
};
use meshchat_crypto::{KEYPAIR_SEED_SIZE, Keypair};
use meshchat_proto::{PeerId, WireMessage};
use proptest::prelude::*;

fn armored(byte: u8) -> String {
    Keypair::generate(&[byte.max(1); KEYPAIR_SEED_SIZE]).expect("keypair").public().armor()
}

proptest! {
    #[test]
    fn prop_parse_never_panics(input in ".{0,64}") {
        let _ = parse_command(&input);
    }

    #[test]
    fn prop_non_slash_input_is_not_a_command(input in "[^/ ][^/]{0,32}") {
        prop_assert_eq!(parse_command(&input), Err(CommandError::NotACommand));
    }

    #[test]
    fn prop_command_names_are_case_insensitive(
        name in prop::sample::select(vec![
            "help", "close", "close_entry", "open_entry", "clear", "ping", "fingerprint", "members",
        ]),
        upper in prop::collection::vec(any::<bool>(), 16),
    ) {
        let mixed: String = name
            .chars()
            .zip(upper.iter().cycle())
            .map(|(c, up)| if *up { c.to_ascii_uppercase() } else { c })
            .collect();

        prop_assert_eq!(parse_command(&format!("/{mixed}")), parse_command(&format!("/{name}")));
        let plain = format!("/{name}");
        prop_assert!(parse_command(&plain).is_ok());
    }

    #[test]
    fn prop_removing_keys_is_idempotent(
        imports in prop::collection::vec((0u8..6, 1u8..20), 0..12),
        removals in prop::collection::vec(0u8..6, 0..12),
    ) {
        let mut once = KeyStore::new();
        let mut twice = KeyStore::new();

        for (peer, key) in &imports {
            let peer = PeerId::new(format!("peer-{peer}"));
            once.import_peer_key(&peer, &armored(*key)).expect("import");
            twice.import_peer_key(&peer, &armored(*key)).expect("import");
        }

        for peer in &removals {
            let peer = PeerId::new(format!("peer-{peer}"));
            once.remove_peer_key(&peer);
            twice.remove_peer_key(&peer);
            twice.remove_peer_key(&peer);
        }

        prop_assert_eq!(once.peer_count(), twice.peer_count());
        for peer in 0u8..6 {
            let peer = PeerId::new(format!("peer-{peer}"));
            prop_assert_eq!(once.peer_fingerprint(&peer), twice.peer_fingerprint(&peer));
        }
    }

    #[test]
    fn prop_connect_to_never_duplicates(targets in prop::collection::vec(0u8..5, 0..20)) {
        let mut registry: ConnectionRegistry<Duration> = ConnectionRegistry::new();
        registry.create_as_rendezvous(PeerId::new("self"));
        registry.on_registered(PeerId::new("self"));

        let mut connects = 0usize;
        let mut distinct = std::collections::BTreeSet::new();
        for target in targets {
            let peer = PeerId::new(format!("peer-{target}"));
            distinct.insert(peer.clone());
            if registry.connect_to(&peer).is_some() {
                connects += 1;
            }
        }
        prop_assert_eq!(connects, distinct.len());
    }

    #[test]
    fn prop_broadcast_reaches_exactly_open_channels(
        open in prop::collection::btree_set(0u8..8, 0..8),
        connecting in prop::collection::btree_set(8u8..12, 0..4),
    ) {
        let mut registry: ConnectionRegistry<Duration> = ConnectionRegistry::new();
        registry.create_as_rendezvous(PeerId::new("self"));
        registry.on_registered(PeerId::new("self"));

        for id in &open {
            registry.on_channel_opened(&PeerId::new(format!("peer-{id}")), Direction::Inbound);
        }
        for id in &connecting {
            registry.connect_to(&PeerId::new(format!("peer-{id}")));
        }

        let actions = registry.broadcast(&WireMessage::Clear, None);
        prop_assert_eq!(actions.len(), open.len());
        for action in actions {
            prop_assert!(matches!(action, TransportAction::Send { .. }), "unexpected action");
        }
    }
}
