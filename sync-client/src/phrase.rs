//! The secret phrase: root of trust for every derived key.

use bip39::{Language, Mnemonic};
use zeroize::Zeroizing;

use crate::crypto::{random_bytes, CryptoError};

/// A BIP-39 English mnemonic, normalized.
///
/// Never transmitted and never persisted by this crate. Debug output is
/// redacted and the buffer is wiped on drop.
pub struct SecretPhrase(Zeroizing<String>);

impl SecretPhrase {
    /// Parse and validate user input.
    ///
    /// Case and surrounding or repeated whitespace are normalized away so the
    /// same words always derive the same keys.
    pub fn parse(input: &str) -> Result<Self, CryptoError> {
        let normalized = Zeroizing::new(
            input
                .split_whitespace()
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(" "),
        );
        Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|e| CryptoError::InvalidPhrase(e.to_string()))?;
        Ok(Self(normalized))
    }

    /// Generate a fresh 12-word phrase from 128 bits of OS randomness.
    pub fn generate() -> Result<Self, CryptoError> {
        let entropy = Zeroizing::new(random_bytes::<16>()?);
        let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy.as_slice())
            .map_err(|e| CryptoError::InvalidPhrase(e.to_string()))?;
        Ok(Self(Zeroizing::new(mnemonic.to_string())))
    }

    /// The normalized phrase. Handle with care.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Number of words.
    pub fn word_count(&self) -> usize {
        self.0.split(' ').count()
    }
}

impl std::fmt::Debug for SecretPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretPhrase([REDACTED])")
    }
}

#[cfg(test)]
pub(crate) const TEST_PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
