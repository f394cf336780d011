//! Encrypted file payloads.
//!
//! A `file` message carries a sealed [`FileEnvelope`]. Receivers decrypt it and
//! run [`FileEnvelope::validate`] before anything is rendered; a rejected
//! envelope is reported with its reason and never displayed.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Maximum file name length in characters.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Allowance for base64 expansion of the `data` field, in percent of the raw
/// size ceiling.
pub const ENCODING_OVERHEAD_PERCENT: usize = 137;

/// File metadata and base64-encoded content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEnvelope {
    /// Original file name.
    pub file_name: String,
    /// MIME type reported by the sender.
    pub mime_type: String,
    /// Raw (decoded) size in bytes.
    pub file_size: u64,
    /// Base64-encoded content.
    pub data: String,
}

impl FileEnvelope {
    /// Build an envelope around raw file bytes.
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            file_size: bytes.len() as u64,
            data: BASE64.encode(bytes),
        }
    }

    /// Sender-side pre-check on the raw file, before encoding or encryption.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FileRejected` if `raw_len` exceeds `max_file_size`
    pub fn check_outgoing(raw_len: usize, max_file_size: usize) -> Result<()> {
        if raw_len > max_file_size {
            return Err(ProtocolError::file_rejected(format!(
                "file is {raw_len} bytes, limit is {max_file_size} bytes"
            )));
        }
        Ok(())
    }

    /// Validate a received envelope and return the decoded content.
    ///
    /// Rules, in order:
    /// - `data` is a non-empty string no longer than the ceiling scaled by
    ///   [`ENCODING_OVERHEAD_PERCENT`]
    /// - `fileSize` does not exceed the ceiling
    /// - `fileName` is non-empty and at most [`MAX_FILE_NAME_LEN`] characters
    /// - `data` is valid base64 whose decoded length equals `fileSize`
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FileRejected` with the first violated rule
    pub fn validate(&self, max_file_size: usize) -> Result<Vec<u8>> {
        if self.data.is_empty() {
            return Err(ProtocolError::file_rejected("file data is empty"));
        }

        let max_encoded = max_file_size.saturating_mul(ENCODING_OVERHEAD_PERCENT) / 100;
        if self.data.len() > max_encoded {
            return Err(ProtocolError::file_rejected(format!(
                "encoded data is {} bytes, limit is {max_encoded} bytes",
                self.data.len()
            )));
        }

        if self.file_size > max_file_size as u64 {
            return Err(ProtocolError::file_rejected(format!(
                "file is {} bytes, limit is {max_file_size} bytes",
                self.file_size
            )));
        }

        if self.file_name.trim().is_empty() {
            return Err(ProtocolError::file_rejected("file name is empty"));
        }

        let name_len = self.file_name.chars().count();
        if name_len > MAX_FILE_NAME_LEN {
            return Err(ProtocolError::file_rejected(format!(
                "file name is {name_len} characters, limit is {MAX_FILE_NAME_LEN}"
            )));
        }

        let bytes = BASE64
            .decode(self.data.as_bytes())
            .map_err(|e| ProtocolError::file_rejected(format!("file data is not base64: {e}")))?;

        if bytes.len() as u64 != self.file_size {
            return Err(ProtocolError::file_rejected(format!(
                "declared size {} does not match content size {}",
                self.file_size,
                bytes.len()
            )));
        }

        Ok(bytes)
    }

    /// Encode to CBOR bytes (the plaintext that gets sealed).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CEILING: usize = 1024;

    #[test]
    fn accepts_file_at_ceiling() {
        let envelope = FileEnvelope::new("notes.txt", "text/plain", &vec![7u8; CEILING]);
        let bytes = envelope.validate(CEILING).unwrap();
        assert_eq!(bytes.len(), CEILING);
    }

    #[test]
    fn rejects_declared_size_one_over_ceiling() {
        let mut envelope = FileEnvelope::new("notes.txt", "text/plain", &vec![7u8; CEILING]);
        envelope.file_size = CEILING as u64 + 1;
        assert!(matches!(envelope.validate(CEILING), Err(ProtocolError::FileRejected { .. })));
    }

    #[test]
    fn rejects_content_one_over_ceiling() {
        let envelope = FileEnvelope::new("notes.txt", "text/plain", &vec![7u8; CEILING + 1]);
        assert!(matches!(envelope.validate(CEILING), Err(ProtocolError::FileRejected { .. })));
    }

    #[test]
    fn rejects_empty_name_regardless_of_size() {
        let envelope = FileEnvelope::new("", "text/plain", b"x");
        let err = envelope.validate(CEILING).unwrap_err();
        assert!(err.to_string().contains("name is empty"));
    }

    #[test]
    fn rejects_overlong_name() {
        let envelope = FileEnvelope::new("n".repeat(MAX_FILE_NAME_LEN + 1), "text/plain", b"x");
        assert!(envelope.validate(CEILING).is_err());

        let envelope = FileEnvelope::new("n".repeat(MAX_FILE_NAME_LEN), "text/plain", b"x");
        assert!(envelope.validate(CEILING).is_ok());
    }

    #[test]
    fn rejects_empty_data() {
        let envelope = FileEnvelope::new("empty.bin", "application/octet-stream", b"");
        assert!(envelope.validate(CEILING).is_err());
    }

    #[test]
    fn rejects_oversized_encoding() {
        let mut envelope = FileEnvelope::new("a.bin", "application/octet-stream", b"abc");
        envelope.data = "A".repeat(CEILING * ENCODING_OVERHEAD_PERCENT / 100 + 1);
        let err = envelope.validate(CEILING).unwrap_err();
        assert!(err.to_string().contains("encoded data"));
    }

    #[test]
    fn rejects_size_mismatch() {
        let mut envelope = FileEnvelope::new("a.bin", "application/octet-stream", b"abcdef");
        envelope.file_size = 3;
        assert!(envelope.validate(CEILING).is_err());
    }

    #[test]
    fn outgoing_precheck() {
        assert!(FileEnvelope::check_outgoing(CEILING, CEILING).is_ok());
        assert!(FileEnvelope::check_outgoing(CEILING + 1, CEILING).is_err());
    }

    #[test]
    fn cbor_roundtrip() {
        let envelope = FileEnvelope::new("photo.png", "image/png", &[1, 2, 3, 4]);
        let decoded = FileEnvelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }
}
