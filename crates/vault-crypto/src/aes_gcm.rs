//! AES-256-GCM encryption for secret values.
//!
//! Every call draws a fresh 12-byte nonce from the OS CSPRNG, so encrypting
//! the same plaintext twice under one key yields two different envelopes.
//! Decryption fails closed: a tag mismatch is always an error.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use crate::envelope::Envelope;
use crate::error::CryptoError;
use crate::key::SecretKey;
use crate::types::AES_GCM_NONCE_LENGTH;

/// Generate a random 12-byte nonce for AES-GCM.
pub fn generate_nonce() -> Result<[u8; AES_GCM_NONCE_LENGTH], CryptoError> {
    let mut nonce = [0u8; AES_GCM_NONCE_LENGTH];
    getrandom::getrandom(&mut nonce).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(nonce)
}

fn cipher_for(key: &SecretKey) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Encrypt raw bytes into a current-version envelope.
pub fn seal(plaintext: &[u8], key: &SecretKey) -> Result<Envelope, CryptoError> {
    let cipher = cipher_for(key)?;
    let nonce = generate_nonce()?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    Ok(Envelope::current(nonce, ciphertext))
}

/// Decrypt a parsed envelope of any supported version.
pub fn open(envelope: &Envelope, key: &SecretKey) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = cipher_for(key)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(envelope.nonce()), envelope.ciphertext())
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    Ok(Zeroizing::new(plaintext))
}

/// Encrypt a UTF-8 string, returning the `v1:nonce:ciphertext` wire string.
pub fn encrypt(plaintext: &str, key: &SecretKey) -> Result<String, CryptoError> {
    Ok(seal(plaintext.as_bytes(), key)?.encode())
}

/// Decrypt a wire string in the current or legacy format.
pub fn decrypt(encrypted: &str, key: &SecretKey) -> Result<String, CryptoError> {
    let envelope = Envelope::parse(encrypted)?;
    let plaintext = open(&envelope, key)?;
    String::from_utf8(plaintext.to_vec()).map_err(|e| {
        let mut bytes = e.into_bytes();
        zeroize::Zeroize::zeroize(&mut bytes);
        CryptoError::InvalidUtf8
    })
}

/// `encrypt` with a hex key, validated before any cipher is built.
pub fn encrypt_with_hex(plaintext: &str, key_hex: &str) -> Result<String, CryptoError> {
    let key = SecretKey::from_hex(key_hex)?;
    encrypt(plaintext, &key)
}

/// `decrypt` with a hex key, validated before any cipher is built.
pub fn decrypt_with_hex(encrypted: &str, key_hex: &str) -> Result<String, CryptoError> {
    let key = SecretKey::from_hex(key_hex)?;
    decrypt(encrypted, &key)
}
