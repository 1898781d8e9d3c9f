//! 256-bit symmetric keys and their hex representation.
//!
//! Both the KEK and the legacy global key arrive as 64 hex characters.
//! Validation is eager: length and character class are checked before any
//! bytes are decoded, so a malformed key never reaches a cipher.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;
use crate::types::{AES_KEY_LENGTH, KEY_HEX_LENGTH};

/// Check that `key_hex` spells a 256-bit key.
///
/// Wrong length and non-hex characters are reported as distinct errors.
pub fn validate_key_hex(key_hex: &str) -> Result<(), CryptoError> {
    let got = key_hex.chars().count();
    if got != KEY_HEX_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_HEX_LENGTH,
            got,
        });
    }
    if let Some((position, character)) = key_hex
        .chars()
        .enumerate()
        .find(|(_, c)| !c.is_ascii_hexdigit())
    {
        return Err(CryptoError::NonHexKey {
            character,
            position,
        });
    }
    Ok(())
}

/// A raw 256-bit AES key. Zeroized on drop; `Debug` never prints key bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; AES_KEY_LENGTH]);

impl SecretKey {
    /// Parse a key from 64 hex characters (either case).
    pub fn from_hex(key_hex: &str) -> Result<Self, CryptoError> {
        validate_key_hex(key_hex)?;
        let mut bytes = [0u8; AES_KEY_LENGTH];
        hex::decode_to_slice(key_hex, &mut bytes).map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_HEX_LENGTH,
            got: key_hex.len(),
        })?;
        let key = Self(bytes);
        bytes.zeroize();
        Ok(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; AES_KEY_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyBytes {
                expected: AES_KEY_LENGTH,
                got: bytes.len(),
            })?;
        Ok(Self(array))
    }

    /// Draw a fresh key from the OS CSPRNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; AES_KEY_LENGTH];
        getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
        let key = Self(bytes);
        bytes.zeroize();
        Ok(key)
    }

    pub fn as_bytes(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.0
    }

    /// Lowercase hex encoding, wiped when the returned value is dropped.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0))
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        // No early exit on the first differing byte.
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}
