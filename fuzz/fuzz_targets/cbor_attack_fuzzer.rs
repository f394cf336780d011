//! Fuzz target for hostile CBOR aimed at the message decoder
//!
//! # Strategy
//!
//! - Deeply nested: arrays/maps nested to arbitrary depth (stack overflow)
//! - Huge lengths: strings and arrays claiming massive lengths (memory)
//! - Tag confusion: a known `type` tag with fields of the wrong shape
//! - Duplicate keys: repeated `type` entries with different tags
//!
//! # Invariants
//!
//! - Huge claimed lengths are rejected, not allocated
//! - Wrong field shapes return an error
//! - NEVER panic on malformed CBOR

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use meshchat_proto::{FileEnvelope, WireMessage};

const TAGS: [&str; 14] = [
    "key_exchange",
    "peer_list",
    "peer_joined",
    "peer_left",
    "leave",
    "chat",
    "file",
    "close",
    "clear",
    "entry_closed",
    "entry_opened",
    "ping",
    "pong",
    "unknown",
];

const FIELDS: [&str; 7] =
    ["publicKey", "codename", "peers", "peerId", "ciphertext", "timestamp", "fileName"];

#[derive(Debug, Clone, Arbitrary)]
enum CborAttack {
    DeeplyNested { depth: u8, as_map: bool },
    HugeLength { claimed_len_exponent: u8, tag: u8 },
    TagConfusion { tag: u8, field: u8, value: Vec<u8> },
    DuplicateKeys { first: u8, second: u8 },
}

fuzz_target!(|attack: CborAttack| {
    let bytes = match attack {
        CborAttack::DeeplyNested { depth, as_map } => {
            let mut bytes = tagged_map_header(2, pick(&TAGS, 0));
            text(&mut bytes, "peers");
            for _ in 0..depth {
                if as_map {
                    bytes.extend_from_slice(&[0xA1, 0x61, b'a']);
                } else {
                    bytes.push(0x81);
                }
            }
            bytes.push(0x01);
            bytes
        },

        CborAttack::HugeLength { claimed_len_exponent, tag } => {
            let exponent = u32::from(claimed_len_exponent % 33);
            let claimed = if exponent < 32 { 1u32 << exponent } else { u32::MAX };

            let mut bytes = tagged_map_header(2, pick(&TAGS, tag));
            text(&mut bytes, "ciphertext");
            bytes.push(0x7A);
            bytes.extend_from_slice(&claimed.to_be_bytes());
            bytes.extend(vec![b'x'; (claimed as usize).min(10)]);
            bytes
        },

        CborAttack::TagConfusion { tag, field, value } => {
            let mut bytes = tagged_map_header(2, pick(&TAGS, tag));
            text(&mut bytes, pick(&FIELDS, field));
            bytes.extend_from_slice(&value);
            bytes
        },

        CborAttack::DuplicateKeys { first, second } => {
            let mut bytes = tagged_map_header(2, pick(&TAGS, first));
            text(&mut bytes, "type");
            text(&mut bytes, pick(&TAGS, second));
            bytes
        },
    };

    let _ = WireMessage::decode(&bytes);
    let _ = FileEnvelope::decode(&bytes);
});

fn pick<'a>(list: &[&'a str], index: u8) -> &'a str {
    list[usize::from(index) % list.len()]
}

/// Map header with `entries` pairs, the first being `"type": tag`.
fn tagged_map_header(entries: u8, tag: &str) -> Vec<u8> {
    let mut bytes = vec![0xA0 | entries];
    text(&mut bytes, "type");
    text(&mut bytes, tag);
    bytes
}

/// Append a short (< 24 bytes) CBOR text string.
fn text(bytes: &mut Vec<u8>, value: &str) {
    bytes.push(0x60 | value.len() as u8);
    bytes.extend_from_slice(value.as_bytes());
}
