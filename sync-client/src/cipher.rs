//! Hybrid encryption of note payloads.
//!
//! Classical path: XChaCha20-Poly1305 under the bundle's encryption key.
//!
//! Post-quantum path: ML-KEM-768 encapsulation to the bundle's own public
//! key yields a one-time XChaCha20-Poly1305 key. The envelope `data` field
//! then carries the framed output:
//!
//! ```text
//! ┌──────────────┬──────────────────────┬─────────────────────┐
//! │ u32 LE len N │ KEM ciphertext (N)   │ AEAD ciphertext     │
//! └──────────────┴──────────────────────┴─────────────────────┘
//! ```

use sync_core::NotePayload;
use sync_types::Scheme;
use zeroize::Zeroizing;

use crate::crypto::{CryptoError, SymmetricKey};
use crate::keys::KeyBundle;
use crate::pq::KEM_CIPHERTEXT_SIZE;

const LENGTH_PREFIX: usize = 4;

/// How [`encrypt`] picks a scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptPolicy {
    /// Use the post-quantum path whenever the bundle has the keys.
    pub prefer_post_quantum: bool,
    /// On a post-quantum failure, encrypt classically instead of failing.
    ///
    /// This weakens the resulting envelope; every fallback is logged.
    pub allow_classical_fallback: bool,
}

impl Default for EncryptPolicy {
    fn default() -> Self {
        Self {
            prefer_post_quantum: true,
            allow_classical_fallback: false,
        }
    }
}

/// Output of [`encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Scheme actually used.
    pub scheme: Scheme,
    /// AEAD nonce.
    pub nonce: Vec<u8>,
    /// Ciphertext, framed for [`Scheme::PostQuantum`].
    pub ciphertext: Vec<u8>,
}

/// Encrypt a payload with the scheme chosen by `policy` and the available keys.
pub fn encrypt(
    keys: &KeyBundle,
    payload: &NotePayload,
    policy: &EncryptPolicy,
) -> Result<Sealed, CryptoError> {
    let plaintext = Zeroizing::new(payload.to_bytes()?);

    if policy.prefer_post_quantum && keys.has_post_quantum() {
        match encrypt_post_quantum(keys, &plaintext) {
            Ok(sealed) => return Ok(sealed),
            Err(e) if policy.allow_classical_fallback => {
                tracing::warn!(
                    "post-quantum encryption failed, falling back to classical: {}",
                    e
                );
            }
            Err(e) => return Err(e),
        }
    }

    encrypt_classical(keys, &plaintext)
}

/// Decrypt a payload protected with `scheme`.
///
/// Never retries with the other scheme.
pub fn decrypt(
    keys: &KeyBundle,
    scheme: Scheme,
    data: &[u8],
    nonce: &[u8],
) -> Result<NotePayload, CryptoError> {
    let plaintext = Zeroizing::new(match scheme {
        Scheme::Classical => keys.encryption_key().decrypt(data, nonce)?,
        Scheme::PostQuantum => {
            let (kem_ciphertext, aead_ciphertext) = unframe(data)?;
            let shared = keys.pq_encap()?.decapsulate(kem_ciphertext)?;
            SymmetricKey::from_bytes(*shared).decrypt(aead_ciphertext, nonce)?
        }
    });
    NotePayload::from_bytes(&plaintext)
        .map_err(|e| CryptoError::DecryptionFailed(format!("payload is not a note: {e}")))
}

fn encrypt_classical(keys: &KeyBundle, plaintext: &[u8]) -> Result<Sealed, CryptoError> {
    let (ciphertext, nonce) = keys.encryption_key().encrypt(plaintext)?;
    Ok(Sealed {
        scheme: Scheme::Classical,
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

fn encrypt_post_quantum(keys: &KeyBundle, plaintext: &[u8]) -> Result<Sealed, CryptoError> {
    let (kem_ciphertext, shared) = keys.pq_encap()?.encapsulate()?;
    let (aead_ciphertext, nonce) = SymmetricKey::from_bytes(*shared).encrypt(plaintext)?;
    Ok(Sealed {
        scheme: Scheme::PostQuantum,
        nonce: nonce.to_vec(),
        ciphertext: frame(&kem_ciphertext, &aead_ciphertext)?,
    })
}

fn frame(kem_ciphertext: &[u8], aead_ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let len = u32::try_from(kem_ciphertext.len())
        .map_err(|_| CryptoError::EncryptionFailed("kem ciphertext too large".into()))?;
    let mut out = Vec::with_capacity(LENGTH_PREFIX + kem_ciphertext.len() + aead_ciphertext.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(kem_ciphertext);
    out.extend_from_slice(aead_ciphertext);
    Ok(out)
}

fn unframe(data: &[u8]) -> Result<(&[u8], &[u8]), CryptoError> {
    let malformed = |reason: String| CryptoError::DecryptionFailed(format!("malformed frame: {reason}"));

    let (prefix, rest) = data
        .split_first_chunk::<LENGTH_PREFIX>()
        .ok_or_else(|| malformed(format!("{} bytes, no length prefix", data.len())))?;
    let len = u32::from_le_bytes(*prefix) as usize;
    if len != KEM_CIPHERTEXT_SIZE {
        return Err(malformed(format!(
            "kem ciphertext length {len}, expected {KEM_CIPHERTEXT_SIZE}"
        )));
    }
    if rest.len() < len {
        return Err(malformed(format!(
            "length prefix {len} exceeds remaining {} bytes",
            rest.len()
        )));
    }
    Ok(rest.split_at(len))
}
