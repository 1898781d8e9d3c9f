use thiserror::Error;
use vault_crypto::CryptoError;

pub type Result<T> = std::result::Result<T, VaultError>;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A compare-and-swap condition in a batch did not hold; nothing was written.
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Storage task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum VaultError {
    /// Malformed key material. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tenant not found: {tenant}")]
    NotFound { tenant: String },

    /// Authentication failure, wrong key, or corrupted ciphertext.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Unsupported encryption version: {0}")]
    UnsupportedVersion(String),

    /// Missing or unusable process configuration (e.g. no master key). Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Required schema objects are missing: {missing}. Apply the tenant_keys/tenant_secrets schema before running this job.")]
    SchemaNotReady { missing: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),
}

impl VaultError {
    /// Whether repeating the same call could succeed.
    ///
    /// Only write conflicts (a concurrent writer won a compare-and-swap) are
    /// retryable; validation, configuration and decryption errors never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::Storage(StorageError::Conflict(_)))
    }

    pub fn is_decryption(&self) -> bool {
        matches!(self, VaultError::Decryption(_))
    }
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKeyLength { .. }
            | CryptoError::NonHexKey { .. }
            | CryptoError::InvalidKeyBytes { .. } => VaultError::Validation(err.to_string()),
            CryptoError::UnsupportedVersion(version) => VaultError::UnsupportedVersion(version),
            CryptoError::DecryptionFailed(_)
            | CryptoError::InvalidFormat(_)
            | CryptoError::InvalidNonceLength { .. }
            | CryptoError::DataTooShort
            | CryptoError::Base64Decode(_)
            | CryptoError::InvalidUtf8 => VaultError::Decryption(err.to_string()),
            CryptoError::EncryptionFailed(_) | CryptoError::RngFailed(_) => VaultError::Crypto(err),
        }
    }
}
