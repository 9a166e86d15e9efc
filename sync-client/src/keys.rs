//! Key derivation: secret phrase → [`KeyBundle`].
//!
//! ```text
//! phrase ──Argon2id──► seed ──HKDF-SHA256──┬─ "encryption"      → XChaCha20 key
//!                                          ├─ "signing-ed25519" → Ed25519 keypair
//!                                          ├─ "owner-id"        → SHA-256 → OwnerId
//!                                          ├─ "pq-mlkem-d/z"    → ML-KEM-768 keypair
//!                                          └─ "pq-mldsa"        → ML-DSA-65 keypair
//! ```
//!
//! Each sub-key has its own label, so learning one reveals nothing about
//! another. Post-quantum generation is allowed to fail; the bundle then runs
//! classical-only.

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{SigningKey, VerifyingKey};
use hkdf::Hkdf;
use sha2::Sha256;
use sync_types::OwnerId;
use zeroize::Zeroizing;

use crate::crypto::{stretch, CryptoError, KdfParams, SymmetricKey, KEY_SIZE};
use crate::phrase::SecretPhrase;
use crate::pq::{PqEncapKeypair, PqSigningKeypair, PqVerifyingKey};

/// Argon2id salt for phrase stretching.
const SEED_SALT: &[u8] = b"notesync-seed-v1";

/// HKDF salt for sub-key expansion.
const HKDF_SALT: &[u8] = b"notesync-keys-v1";

const LABEL_ENCRYPTION: &[u8] = b"encryption";
const LABEL_SIGNING: &[u8] = b"signing-ed25519";
const LABEL_OWNER: &[u8] = b"owner-id";
const LABEL_MLKEM_D: &[u8] = b"pq-mlkem-d";
const LABEL_MLKEM_Z: &[u8] = b"pq-mlkem-z";
const LABEL_MLDSA: &[u8] = b"pq-mldsa";

/// Options for [`KeyBundle::derive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeriveOptions {
    /// Argon2id cost.
    pub kdf: KdfParams,
    /// Attempt post-quantum key generation.
    pub post_quantum: bool,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            post_quantum: true,
        }
    }
}

/// Public halves used to verify envelopes.
#[derive(Clone)]
pub struct PublicKeys {
    /// Ed25519 verifying key for `version=1`.
    pub classical: VerifyingKey,
    /// ML-DSA-65 verifying key for `version=2`, when available.
    pub post_quantum: Option<PqVerifyingKey>,
}

impl std::fmt::Debug for PublicKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKeys")
            .field("classical", &hex::encode(self.classical.as_bytes()))
            .field("post_quantum", &self.post_quantum.is_some())
            .finish()
    }
}

/// Every key derived from one secret phrase.
///
/// Read-only after derivation; share it behind an `Arc`.
pub struct KeyBundle {
    encryption_key: SymmetricKey,
    signing_key: SigningKey,
    pq_encap: Option<PqEncapKeypair>,
    pq_signing: Option<PqSigningKeypair>,
    public: PublicKeys,
    owner_id: OwnerId,
}

impl KeyBundle {
    /// Derive the bundle for a phrase. Deterministic.
    pub fn derive(phrase: &SecretPhrase, options: &DeriveOptions) -> Result<Self, CryptoError> {
        let seed = stretch(phrase.expose().as_bytes(), SEED_SALT, options.kdf)?;
        Self::from_seed(&seed, options.post_quantum)
    }

    /// Build the bundle from an already-stretched 32-byte seed.
    pub fn from_seed(seed: &[u8; KEY_SIZE], post_quantum: bool) -> Result<Self, CryptoError> {
        let hkdf = Hkdf::<Sha256>::new(Some(HKDF_SALT), seed);
        let expand = |label: &[u8]| -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
            let mut out = Zeroizing::new([0u8; KEY_SIZE]);
            hkdf.expand(label, &mut out[..])
                .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
            Ok(out)
        };

        let encryption_key = SymmetricKey::from_bytes(*expand(LABEL_ENCRYPTION)?);
        let signing_key = SigningKey::from_bytes(&*expand(LABEL_SIGNING)?);
        let owner_id = OwnerId::from_seed(&expand(LABEL_OWNER)?[..]);

        let (pq_encap, pq_signing) = if post_quantum {
            match derive_post_quantum(&expand) {
                Ok((encap, signing)) => (Some(encap), Some(signing)),
                Err(e) => {
                    tracing::warn!("post-quantum keys unavailable, using classical only: {}", e);
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        let public = PublicKeys {
            classical: signing_key.verifying_key(),
            post_quantum: pq_signing.as_ref().map(PqSigningKeypair::verifying_key),
        };

        tracing::debug!(
            owner = %owner_id,
            post_quantum = pq_encap.is_some(),
            "derived key bundle"
        );

        Ok(Self {
            encryption_key,
            signing_key,
            pq_encap,
            pq_signing,
            public,
            owner_id,
        })
    }

    /// Tenant id for the server.
    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    /// Public halves for verification.
    pub fn public_keys(&self) -> &PublicKeys {
        &self.public
    }

    /// Whether both post-quantum keypairs are present.
    pub fn has_post_quantum(&self) -> bool {
        self.pq_encap.is_some() && self.pq_signing.is_some()
    }

    /// Base64 ML-KEM encapsulation key, sent with sync requests.
    pub fn pq_public_key_base64(&self) -> Option<String> {
        self.pq_encap
            .as_ref()
            .map(|k| STANDARD.encode(k.public_key_bytes()))
    }

    pub(crate) fn encryption_key(&self) -> &SymmetricKey {
        &self.encryption_key
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub(crate) fn pq_encap(&self) -> Result<&PqEncapKeypair, CryptoError> {
        self.pq_encap
            .as_ref()
            .ok_or(CryptoError::KeyUnavailable("ml-kem encapsulation keypair"))
    }

    pub(crate) fn pq_signing(&self) -> Result<&PqSigningKeypair, CryptoError> {
        self.pq_signing
            .as_ref()
            .ok_or(CryptoError::KeyUnavailable("ml-dsa signing keypair"))
    }
}

fn derive_post_quantum<F>(expand: &F) -> Result<(PqEncapKeypair, PqSigningKeypair), CryptoError>
where
    F: Fn(&[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError>,
{
    let d = expand(LABEL_MLKEM_D)?;
    let z = expand(LABEL_MLKEM_Z)?;
    let dsa = expand(LABEL_MLDSA)?;
    Ok((
        PqEncapKeypair::from_seeds(&d, &z),
        PqSigningKeypair::from_seed(&dsa),
    ))
}

// Don't leak keys in debug output
impl std::fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBundle")
            .field("owner_id", &self.owner_id)
            .field("keys", &"[REDACTED]")
            .field("post_quantum", &self.has_post_quantum())
            .finish()
    }
}
