//! Data Encryption Key (DEK) primitives.
//!
//! Each tenant gets a random 256-bit DEK. Secret values are encrypted with the
//! DEK; the DEK itself is wrapped (encrypted) with the KEK.
//!
//! Wrapped DEK format: the DEK's lowercase hex text sealed as a `v1`
//! envelope under the KEK, so wrapped keys and secret values share one codec.

use zeroize::Zeroizing;

use crate::aes_gcm::{decrypt, encrypt};
use crate::error::CryptoError;
use crate::key::SecretKey;

/// Generate a random 256-bit Data Encryption Key.
pub fn generate_dek() -> Result<SecretKey, CryptoError> {
    SecretKey::generate()
}

/// Wrap a DEK with the KEK.
pub fn wrap_dek(dek: &SecretKey, kek: &SecretKey) -> Result<String, CryptoError> {
    encrypt(dek.to_hex().as_str(), kek)
}

/// Unwrap a DEK previously produced by [`wrap_dek`].
pub fn unwrap_dek(wrapped_dek: &str, kek: &SecretKey) -> Result<SecretKey, CryptoError> {
    let dek_hex = Zeroizing::new(decrypt(wrapped_dek, kek)?);
    SecretKey::from_hex(&dek_hex)
}
