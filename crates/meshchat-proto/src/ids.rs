//! Participant and channel identifiers.
//!
//! A [`PeerId`] is opaque: joiners receive theirs from the rendezvous
//! collaborator, while the creator's is derived from the [`ChannelId`] so that
//! anyone holding the link can find it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Maximum codename length in characters.
pub const MAX_CODENAME_LEN: usize = 100;

/// Number of words in a human-memorable channel code.
const CHANNEL_WORDS: usize = 4;

/// Bounds for legacy opaque channel tokens.
const TOKEN_MIN_LEN: usize = 8;
const TOKEN_MAX_LEN: usize = 64;

/// Process-unique participant identifier on the rendezvous network.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap a rendezvous-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Shareable channel identity.
///
/// Either a 4-word code (`bold-echo-fern-grid`) or, for the legacy 1:1
/// variant, an opaque token. Not secret: anyone with the link may attempt to
/// join, so admission is governed by the creator's entry gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    /// Parse and validate a channel identifier.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidChannelId` if the input is neither a word code
    ///   nor a legacy token
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if is_word_code(input) || is_legacy_token(input) {
            Ok(Self(input.to_string()))
        } else {
            Err(ProtocolError::InvalidChannelId {
                reason: format!(
                    "expected {CHANNEL_WORDS} lowercase words joined by '-' or a \
                     {TOKEN_MIN_LEN}-{TOKEN_MAX_LEN} character token"
                ),
            })
        }
    }

    /// Parse from a URL fragment (`#bold-echo-fern-grid`). The leading `#` is
    /// optional.
    pub fn from_fragment(fragment: &str) -> Result<Self> {
        Self::parse(fragment.strip_prefix('#').unwrap_or(fragment))
    }

    /// Representation suitable for a URL fragment.
    pub fn to_fragment(&self) -> String {
        format!("#{}", self.0)
    }

    /// Whether this is a human-memorable word code rather than a legacy token.
    pub fn is_word_code(&self) -> bool {
        is_word_code(&self.0)
    }

    /// Rendezvous identifier of the channel creator: `<prefix>-<channelId>`.
    pub fn creator_peer_id(&self, prefix: &str) -> PeerId {
        PeerId(format!("{prefix}-{}", self.0))
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_word_code(input: &str) -> bool {
    let words: Vec<&str> = input.split('-').collect();
    words.len() == CHANNEL_WORDS
        && words.iter().all(|w| !w.is_empty() && w.chars().all(|c| c.is_ascii_lowercase()))
}

fn is_legacy_token(input: &str) -> bool {
    (TOKEN_MIN_LEN..=TOKEN_MAX_LEN).contains(&input.len())
        && input.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a participant codename.
///
/// Codenames must contain a non-whitespace character and be at most
/// [`MAX_CODENAME_LEN`] characters.
///
/// # Errors
///
/// - `ProtocolError::InvalidCodename` on violation
pub fn validate_codename(codename: &str) -> Result<()> {
    if codename.trim().is_empty() {
        return Err(ProtocolError::InvalidCodename { reason: "codename is empty".to_string() });
    }

    let len = codename.chars().count();
    if len > MAX_CODENAME_LEN {
        return Err(ProtocolError::InvalidCodename {
            reason: format!("codename is {len} characters, limit is {MAX_CODENAME_LEN}"),
        });
    }

    Ok(())
}
