//! Envelope - the encrypted, signed wire form of one note.
//!
//! Two representations exist. [`WireEnvelope`] is the flat JSON record that
//! crosses the network and is stored by the server. [`Envelope`] is the
//! validated form: its [`Scheme`] tag replaces the `version` /
//! `signatureVersion` pair, the id is parsed and byte fields are decoded.
//! Anything that cannot be represented as an [`Envelope`] never reaches the
//! crypto layer.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::{EnvelopeError, NoteId};

/// Cryptographic scheme that protected an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Scheme {
    /// XChaCha20-Poly1305 under the phrase key, Ed25519 signature
    Classical = 1,
    /// ML-KEM-768 self-encapsulation, ML-DSA-65 signature
    PostQuantum = 2,
}

impl Scheme {
    /// Wire `version` number of this scheme.
    pub fn version(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Scheme {
    type Error = EnvelopeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Scheme::Classical),
            2 => Ok(Scheme::PostQuantum),
            _ => Err(EnvelopeError::UnknownVersion(value)),
        }
    }
}

/// Flat wire record, exactly as exchanged with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// 16-char lowercase hex note id
    pub id: String,
    /// Base64 ciphertext
    pub data: String,
    /// Base64 nonce
    pub nonce: String,
    /// Mirrors the note's `updated_at`
    pub timestamp: i64,
    /// Base64 signature over the canonical form
    pub signature: String,
    /// 1 = classical, 2 = post-quantum
    pub version: u8,
    /// Must equal `version`
    #[serde(rename = "signatureVersion")]
    pub signature_version: u8,
    /// Tombstone flag, omitted when false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

impl WireEnvelope {
    /// Whether this record is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }
}

/// Validated envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Note id
    pub id: NoteId,
    /// Scheme tag; serialized as both `version` and `signatureVersion`
    pub scheme: Scheme,
    /// Mirrors the note's `updated_at` (ms)
    pub timestamp: i64,
    /// AEAD nonce
    pub nonce: Vec<u8>,
    /// Ciphertext (framed with the KEM ciphertext for post-quantum)
    pub data: Vec<u8>,
    /// Signature over [`Envelope::signable_bytes`]; empty until signed
    pub signature: Vec<u8>,
    /// Tombstone flag
    pub deleted: bool,
}

/// Field order here is the canonical order. Do not reorder.
#[derive(Serialize)]
struct Canonical<'a> {
    id: &'a str,
    version: u8,
    #[serde(rename = "signatureVersion")]
    signature_version: u8,
    timestamp: i64,
    nonce: &'a str,
    data: &'a str,
    #[serde(skip_serializing_if = "is_false")]
    deleted: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Envelope {
    /// Create an envelope with an empty signature.
    pub fn unsigned(
        id: NoteId,
        scheme: Scheme,
        timestamp: i64,
        nonce: Vec<u8>,
        data: Vec<u8>,
        deleted: bool,
    ) -> Self {
        Self {
            id,
            scheme,
            timestamp,
            nonce,
            data,
            signature: Vec::new(),
            deleted,
        }
    }

    /// Canonical bytes covered by the signature.
    ///
    /// Compact JSON with keys in the fixed order
    /// `id, version, signatureVersion, timestamp, nonce, data, deleted`,
    /// where `deleted` appears only when true and byte fields are standard
    /// base64. Both ends must produce identical bytes.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        let id = self.id.to_hex();
        let nonce = STANDARD.encode(&self.nonce);
        let data = STANDARD.encode(&self.data);
        let canonical = Canonical {
            id: &id,
            version: self.scheme.version(),
            signature_version: self.scheme.version(),
            timestamp: self.timestamp,
            nonce: &nonce,
            data: &data,
            deleted: self.deleted,
        };
        Ok(serde_json::to_vec(&canonical)?)
    }

    /// Encode for the network.
    pub fn to_wire(&self) -> WireEnvelope {
        WireEnvelope {
            id: self.id.to_hex(),
            data: STANDARD.encode(&self.data),
            nonce: STANDARD.encode(&self.nonce),
            timestamp: self.timestamp,
            signature: STANDARD.encode(&self.signature),
            version: self.scheme.version(),
            signature_version: self.scheme.version(),
            deleted: self.deleted.then_some(true),
        }
    }
}

impl TryFrom<&WireEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(wire: &WireEnvelope) -> Result<Self, Self::Error> {
        let scheme = Scheme::try_from(wire.version)?;
        if wire.signature_version != wire.version {
            return Err(EnvelopeError::VersionMismatch {
                version: wire.version,
                signature_version: wire.signature_version,
            });
        }
        let id = NoteId::from_hex(&wire.id).ok_or_else(|| EnvelopeError::InvalidId(wire.id.clone()))?;

        let decode = |field: &'static str, value: &str| {
            STANDARD
                .decode(value)
                .map_err(|_| EnvelopeError::InvalidEncoding { field })
        };

        Ok(Self {
            id,
            scheme,
            timestamp: wire.timestamp,
            nonce: decode("nonce", &wire.nonce)?,
            data: decode("data", &wire.data)?,
            signature: decode("signature", &wire.signature)?,
            deleted: wire.is_deleted(),
        })
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        Envelope::try_from(&wire)
    }
}
