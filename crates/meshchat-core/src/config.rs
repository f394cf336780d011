//! Session tuning knobs.

use std::time::Duration;

/// How the creator admits newcomers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Accept every handshake while entry is open; the creator toggles entry
    /// with `/close_entry` and `/open_entry`.
    #[default]
    EntryGate,
    /// Legacy 1:1 "link burning": close entry automatically once the first
    /// inbound handshake completes.
    BurnAfterFirst,
}

/// Per-session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline from the join intent to the creator's reciprocal handshake.
    pub join_timeout: Duration,
    /// Delay between a remote `close` (or the last peer leaving) and local
    /// teardown.
    pub teardown_grace: Duration,
    /// Pending pings older than this are forgotten.
    pub ping_timeout: Duration,
    /// Raw file size ceiling in bytes.
    pub max_file_size: usize,
    /// Prefix of the creator's derived rendezvous identifier.
    pub creator_id_prefix: String,
    /// Creator admission rule.
    pub admission: AdmissionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(20),
            teardown_grace: Duration::from_secs(1),
            ping_timeout: Duration::from_secs(10),
            max_file_size: 2 * 1024 * 1024,
            creator_id_prefix: "meshchat".to_string(),
            admission: AdmissionPolicy::EntryGate,
        }
    }
}
