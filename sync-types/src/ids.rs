//! Identity types for notesync.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Identifier of a note.
///
/// Locally a signed 64-bit integer (a creation timestamp in milliseconds);
/// on the wire a fixed-width, 16-character lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteId(i64);

impl NoteId {
    /// Width of the hex form.
    pub const HEX_LEN: usize = 16;

    /// Wrap a local note id.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The local numeric id.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Render as 16 lowercase hex digits of the two's-complement bits.
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0 as u64)
    }

    /// Parse the wire form. Exactly 16 lowercase hex digits are accepted.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != Self::HEX_LEN
            || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return None;
        }
        u64::from_str_radix(s, 16).ok().map(|v| Self(v as i64))
    }
}

impl From<i64> for NoteId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoteId({})", self.0)
    }
}

impl Serialize for NoteId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NoteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NoteId::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid note id: {s:?}")))
    }
}

/// Tenant identifier the server partitions envelopes by.
///
/// A SHA-256 hash of a sub-seed derived from the secret phrase, never the
/// phrase itself. Displayed as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId([u8; 32]);

impl OwnerId {
    /// Hash a derived sub-seed into an owner id.
    pub fn from_seed(seed: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"notesync-owner-id-v1");
        hasher.update(seed);
        let result = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }

    /// Create an OwnerId from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == 32 {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(bytes);
            Some(Self(arr))
        } else {
            None
        }
    }

    /// Parse the hex form.
    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().and_then(|bytes| Self::from_bytes(&bytes))
    }

    /// Get the raw bytes of this OwnerId.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", &self.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_id_hex_is_fixed_width() {
        assert_eq!(NoteId::new(1).to_hex(), "0000000000000001");
        assert_eq!(NoteId::new(255).to_hex(), "00000000000000ff");
        assert_eq!(NoteId::new(1_700_000_000_000).to_hex().len(), 16);
    }

    #[test]
    fn note_id_hex_roundtrip_includes_negative() {
        for value in [0, 1, 1_700_000_000_123, -1, i64::MIN, i64::MAX] {
            let id = NoteId::new(value);
            assert_eq!(NoteId::from_hex(&id.to_hex()), Some(id));
        }
    }

    #[test]
    fn note_id_rejects_malformed_hex() {
        assert!(NoteId::from_hex("1").is_none());
        assert!(NoteId::from_hex("00000000000000FF").is_none()); // uppercase
        assert!(NoteId::from_hex("000000000000000g").is_none());
        assert!(NoteId::from_hex("+00000000000000f").is_none());
        assert!(NoteId::from_hex("00000000000000001").is_none());
    }

    #[test]
    fn note_id_serializes_as_hex_string() {
        let json = serde_json::to_string(&NoteId::new(26)).unwrap();
        assert_eq!(json, "\"000000000000001a\"");
        let back: NoteId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(), 26);
        assert!(serde_json::from_str::<NoteId>("\"xyz\"").is_err());
    }

    #[test]
    fn owner_id_deterministic() {
        assert_eq!(OwnerId::from_seed(b"seed"), OwnerId::from_seed(b"seed"));
        assert_ne!(OwnerId::from_seed(b"seed-1"), OwnerId::from_seed(b"seed-2"));
    }

    #[test]
    fn owner_id_hex_display_and_parse() {
        let id = OwnerId::from_seed(b"seed");
        let display = id.to_string();
        assert_eq!(display.len(), 64);
        assert!(display.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(OwnerId::from_hex(&display), Some(id));
    }

    #[test]
    fn owner_id_from_invalid_length_fails() {
        assert!(OwnerId::from_bytes(&[0u8; 16]).is_none());
        assert!(OwnerId::from_hex("abcd").is_none());
    }
}
