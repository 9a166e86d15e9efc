//! Post-quantum key material: ML-KEM-768 and ML-DSA-65.
//!
//! Both keypairs are generated deterministically from 32-byte sub-seeds so
//! that every device holding the phrase derives the same keys.

use ml_dsa::signature::{Signer, Verifier};
use ml_dsa::{KeyGen, MlDsa65};
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{EncodedSizeUser, KemCore, MlKem768};
use zeroize::Zeroizing;

use crate::crypto::{CryptoError, KEY_SIZE};

type DecapsulationKey = <MlKem768 as KemCore>::DecapsulationKey;
type EncapsulationKey = <MlKem768 as KemCore>::EncapsulationKey;

/// Byte length of an ML-KEM-768 ciphertext.
pub const KEM_CIPHERTEXT_SIZE: usize = 1088;

/// ML-DSA-65 verifying key.
pub type PqVerifyingKey = ml_dsa::VerifyingKey<MlDsa65>;

/// ML-KEM-768 keypair used for self-encapsulation.
pub struct PqEncapKeypair {
    decapsulation: DecapsulationKey,
    encapsulation: EncapsulationKey,
}

impl PqEncapKeypair {
    /// Derive from two independent 32-byte seeds (`d`, `z`).
    pub fn from_seeds(d: &[u8; 32], z: &[u8; 32]) -> Self {
        let (decapsulation, encapsulation) =
            MlKem768::generate_deterministic(&(*d).into(), &(*z).into());
        Self {
            decapsulation,
            encapsulation,
        }
    }

    /// Encoded public encapsulation key.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.encapsulation.as_bytes().to_vec()
    }

    /// Encapsulate to our own public key.
    ///
    /// Returns the KEM ciphertext and a fresh 32-byte shared secret.
    pub fn encapsulate(&self) -> Result<(Vec<u8>, Zeroizing<[u8; KEY_SIZE]>), CryptoError> {
        let (ciphertext, shared) = self
            .encapsulation
            .encapsulate(&mut rand::rngs::OsRng)
            .map_err(|_| CryptoError::EncryptionFailed("ml-kem encapsulation failed".into()))?;
        let mut secret = Zeroizing::new([0u8; KEY_SIZE]);
        secret.copy_from_slice(shared.as_slice());
        Ok((ciphertext.to_vec(), secret))
    }

    /// Recover the shared secret from a KEM ciphertext.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
        let ciphertext = ml_kem::Ciphertext::<MlKem768>::try_from(ciphertext).map_err(|_| {
            CryptoError::DecryptionFailed(format!(
                "ml-kem ciphertext must be {KEM_CIPHERTEXT_SIZE} bytes, got {}",
                ciphertext.len()
            ))
        })?;
        let shared = self
            .decapsulation
            .decapsulate(&ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed("ml-kem decapsulation failed".into()))?;
        let mut secret = Zeroizing::new([0u8; KEY_SIZE]);
        secret.copy_from_slice(shared.as_slice());
        Ok(secret)
    }
}

impl std::fmt::Debug for PqEncapKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PqEncapKeypair {{ decapsulation: [REDACTED] }}")
    }
}

/// ML-DSA-65 signing keypair.
pub struct PqSigningKeypair {
    keypair: ml_dsa::KeyPair<MlDsa65>,
}

impl PqSigningKeypair {
    /// Derive from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            keypair: MlDsa65::key_gen_internal(&(*seed).into()),
        }
    }

    /// Verifying half.
    pub fn verifying_key(&self) -> PqVerifyingKey {
        self.keypair.verifying_key().clone()
    }

    /// Sign raw message bytes (deterministic variant).
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: ml_dsa::Signature<MlDsa65> = self.keypair.signing_key().sign(message);
        signature.encode().to_vec()
    }
}

impl std::fmt::Debug for PqSigningKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PqSigningKeypair {{ signing_key: [REDACTED] }}")
    }
}

/// Verify an ML-DSA-65 signature over raw message bytes.
pub fn verify(key: &PqVerifyingKey, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let signature = ml_dsa::Signature::<MlDsa65>::try_from(signature)
        .map_err(|_| CryptoError::SignatureInvalid("malformed ml-dsa signature".into()))?;
    key.verify(message, &signature)
        .map_err(|_| CryptoError::SignatureInvalid("ml-dsa signature mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kem_roundtrip_recovers_shared_secret() {
        let keypair = PqEncapKeypair::from_seeds(&[1u8; 32], &[2u8; 32]);
        let (ciphertext, sent) = keypair.encapsulate().unwrap();
        assert_eq!(ciphertext.len(), KEM_CIPHERTEXT_SIZE);
        let received = keypair.decapsulate(&ciphertext).unwrap();
        assert_eq!(*sent, *received);
    }

    #[test]
    fn kem_keys_are_deterministic() {
        let a = PqEncapKeypair::from_seeds(&[1u8; 32], &[2u8; 32]);
        let b = PqEncapKeypair::from_seeds(&[1u8; 32], &[2u8; 32]);
        let c = PqEncapKeypair::from_seeds(&[3u8; 32], &[2u8; 32]);
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
        assert_ne!(a.public_key_bytes(), c.public_key_bytes());
    }

    #[test]
    fn kem_rejects_wrong_length_ciphertext() {
        let keypair = PqEncapKeypair::from_seeds(&[1u8; 32], &[2u8; 32]);
        assert!(matches!(
            keypair.decapsulate(&[0u8; 10]),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn dsa_sign_verify() {
        let keypair = PqSigningKeypair::from_seed(&[7u8; 32]);
        let signature = keypair.sign(b"canonical bytes");
        assert!(verify(&keypair.verifying_key(), b"canonical bytes", &signature).is_ok());
        assert!(verify(&keypair.verifying_key(), b"other bytes", &signature).is_err());
    }

    #[test]
    fn dsa_rejects_other_key_and_garbage() {
        let signer = PqSigningKeypair::from_seed(&[7u8; 32]);
        let other = PqSigningKeypair::from_seed(&[8u8; 32]);
        let signature = signer.sign(b"msg");
        assert!(verify(&other.verifying_key(), b"msg", &signature).is_err());
        assert!(verify(&signer.verifying_key(), b"msg", &[0u8; 64]).is_err());
    }
}
