use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key must be {expected} hex characters (256 bits), got {got} characters")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Key contains non-hex character {character:?} at position {position}")]
    NonHexKey { character: char, position: usize },

    #[error("Invalid key bytes: expected {expected} bytes, got {got}")]
    InvalidKeyBytes { expected: usize, got: usize },

    #[error("Invalid encrypted format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported encryption version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid nonce length: expected {expected} bytes, got {got}")]
    InvalidNonceLength { expected: usize, got: usize },

    #[error("Encrypted data too short")]
    DataTooShort,

    #[error("Base64 decode error: {0}")]
    Base64Decode(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Decrypted value is not valid UTF-8")]
    InvalidUtf8,

    #[error("Random number generation failed: {0}")]
    RngFailed(String),
}

impl CryptoError {
    /// True for errors raised while validating key material, before any
    /// cipher was constructed.
    pub fn is_key_validation(&self) -> bool {
        matches!(
            self,
            CryptoError::InvalidKeyLength { .. }
                | CryptoError::NonHexKey { .. }
                | CryptoError::InvalidKeyBytes { .. }
        )
    }
}
