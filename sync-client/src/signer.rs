//! Envelope signing and the seal/open pipeline.
//!
//! `seal`: payload → encrypt → unsigned envelope → sign.
//! `open`: verify → decrypt → check payload against envelope metadata.
//!
//! Verification always happens before decryption, and an envelope is only
//! ever checked with the algorithm its `signatureVersion` names.

use ed25519_dalek::{Signature, Signer, SIGNATURE_LENGTH};
use sha2::{Digest, Sha256};
use sync_core::{EncryptionType, Note};
use sync_types::{Envelope, NoteId, Scheme};
use thiserror::Error;

use crate::cipher::{self, EncryptPolicy};
use crate::crypto::CryptoError;
use crate::keys::{KeyBundle, PublicKeys};
use crate::pq;

/// Pipeline stage where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Encrypting a local note.
    Encrypt,
    /// Signing a sealed envelope.
    Sign,
    /// Talking to the server (health check or sync request).
    Transmit,
    /// Decoding a server envelope.
    Decode,
    /// Verifying a server envelope's signature.
    Verify,
    /// Decrypting a verified envelope.
    Decrypt,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Encrypt => "encrypt",
            Phase::Sign => "sign",
            Phase::Transmit => "transmit",
            Phase::Decode => "decode",
            Phase::Verify => "verify",
            Phase::Decrypt => "decrypt",
        };
        f.write_str(name)
    }
}

/// A per-note failure. Never contains plaintext or key material.
#[derive(Debug, Error)]
#[error("note {id}: {phase} failed: {source}")]
pub struct SealError {
    /// Wire id (or the raw id string when it did not decode).
    pub id: String,
    /// Where it failed.
    pub phase: Phase,
    /// Underlying cause.
    #[source]
    pub source: CryptoError,
}

impl SealError {
    pub(crate) fn new(id: impl Into<String>, phase: Phase, source: CryptoError) -> Self {
        Self {
            id: id.into(),
            phase,
            source,
        }
    }
}

/// Sign an envelope in place with the algorithm its scheme names.
pub fn sign(keys: &KeyBundle, envelope: &mut Envelope) -> Result<(), CryptoError> {
    let canonical = envelope.signable_bytes()?;
    envelope.signature = match envelope.scheme {
        Scheme::Classical => {
            let digest = Sha256::digest(&canonical);
            keys.signing_key().sign(&digest).to_bytes().to_vec()
        }
        Scheme::PostQuantum => keys.pq_signing()?.sign(&canonical),
    };
    Ok(())
}

/// Verify an envelope's signature.
pub fn verify(keys: &PublicKeys, envelope: &Envelope) -> Result<(), CryptoError> {
    let canonical = envelope.signable_bytes()?;
    match envelope.scheme {
        Scheme::Classical => {
            let bytes: &[u8; SIGNATURE_LENGTH] =
                envelope.signature.as_slice().try_into().map_err(|_| {
                    CryptoError::SignatureInvalid(format!(
                        "ed25519 signature must be {SIGNATURE_LENGTH} bytes, got {}",
                        envelope.signature.len()
                    ))
                })?;
            let digest = Sha256::digest(&canonical);
            keys.classical
                .verify_strict(&digest, &Signature::from_bytes(bytes))
                .map_err(|_| CryptoError::SignatureInvalid("ed25519 signature mismatch".into()))
        }
        Scheme::PostQuantum => {
            let key = keys
                .post_quantum
                .as_ref()
                .ok_or(CryptoError::KeyUnavailable("ml-dsa verifying key"))?;
            pq::verify(key, &canonical, &envelope.signature)
        }
    }
}

/// Boolean form of [`verify`]; any failure is `false`.
pub fn is_valid(keys: &PublicKeys, envelope: &Envelope) -> bool {
    verify(keys, envelope).is_ok()
}

/// Encrypt and sign a local note.
pub fn seal(keys: &KeyBundle, note: &Note, policy: &EncryptPolicy) -> Result<Envelope, SealError> {
    let id = note.note_id();
    let sealed = cipher::encrypt(keys, &note.payload(), policy)
        .map_err(|e| SealError::new(id.to_hex(), Phase::Encrypt, e))?;

    let mut envelope = Envelope::unsigned(
        id,
        sealed.scheme,
        note.updated_at,
        sealed.nonce,
        sealed.ciphertext,
        note.deleted,
    );
    sign(keys, &mut envelope).map_err(|e| SealError::new(id.to_hex(), Phase::Sign, e))?;
    Ok(envelope)
}

/// Verify, then decrypt a server envelope into a note.
///
/// The decrypted payload must agree with the signed metadata: `updated_at`
/// equals the envelope timestamp and the tombstone flags match.
pub fn open(keys: &KeyBundle, envelope: &Envelope) -> Result<Note, SealError> {
    let id = envelope.id;
    let fail = |phase, e| SealError::new(id.to_hex(), phase, e);

    verify(keys.public_keys(), envelope).map_err(|e| fail(Phase::Verify, e))?;

    let payload = cipher::decrypt(keys, envelope.scheme, &envelope.data, &envelope.nonce)
        .map_err(|e| fail(Phase::Decrypt, e))?;
    check_metadata(id, envelope, payload.updated_at, payload.deleted)
        .map_err(|e| fail(Phase::Decrypt, e))?;

    Ok(Note::from_payload(
        id,
        payload,
        EncryptionType::from(envelope.scheme),
    ))
}

fn check_metadata(
    id: NoteId,
    envelope: &Envelope,
    updated_at: i64,
    deleted: bool,
) -> Result<(), CryptoError> {
    if updated_at != envelope.timestamp {
        return Err(CryptoError::DecryptionFailed(format!(
            "payload of {id} has updated_at {updated_at}, envelope says {}",
            envelope.timestamp
        )));
    }
    if deleted != envelope.deleted {
        return Err(CryptoError::DecryptionFailed(format!(
            "payload of {id} disagrees with envelope tombstone flag"
        )));
    }
    Ok(())
}
