//! Fuzz target for receiver-side file validation
//!
//! A decrypted `file` payload is attacker-controlled until
//! `FileEnvelope::validate` accepts it.
//!
//! # Invariants
//!
//! - Decoding and validation NEVER panic
//! - An accepted envelope's content is exactly `fileSize` bytes and within
//!   the ceiling

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use meshchat_proto::FileEnvelope;

#[derive(Debug, Arbitrary)]
enum Input {
    Raw { bytes: Vec<u8>, ceiling: u16 },
    Fields { file_name: String, mime_type: String, file_size: u64, data: String, ceiling: u16 },
}

fuzz_target!(|input: Input| {
    let (envelope, ceiling) = match input {
        Input::Raw { bytes, ceiling } => match FileEnvelope::decode(&bytes) {
            Ok(envelope) => (envelope, ceiling),
            Err(_) => return,
        },
        Input::Fields { file_name, mime_type, file_size, data, ceiling } => {
            (FileEnvelope { file_name, mime_type, file_size, data }, ceiling)
        },
    };

    let ceiling = usize::from(ceiling);
    if let Ok(content) = envelope.validate(ceiling) {
        assert_eq!(content.len() as u64, envelope.file_size);
        assert!(content.len() <= ceiling);
        assert!(!envelope.file_name.trim().is_empty());
    }
});
