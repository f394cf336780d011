//! Fuzz target for WireMessage::decode
//!
//! Peers are untrusted: any byte sequence may arrive on a channel.
//!
//! # Invariants
//!
//! - Decoding NEVER panics; invalid input returns an error
//! - A decoded message re-encodes, and decoding that yields an equal message

#![no_main]

use libfuzzer_sys::fuzz_target;
use meshchat_proto::WireMessage;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = WireMessage::decode(data) else {
        return;
    };

    let bytes = message.encode().expect("decoded message must re-encode");
    let again = WireMessage::decode(&bytes).expect("re-encoded message must decode");
    assert_eq!(message, again);
});
