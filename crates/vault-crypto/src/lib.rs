//! Cipher codec for tenant-vault: AES-256-GCM envelopes with a versioned
//! textual wire format, eager hex key validation, and DEK wrapping.

pub mod aes_gcm;
pub mod base64;
pub mod diagnose;
pub mod envelope;
pub mod error;
pub mod key;
pub mod types;
pub mod wrap;

pub use aes_gcm::{decrypt, decrypt_with_hex, encrypt, encrypt_with_hex, open, seal};
pub use base64::{base64_decode, base64_encode};
pub use diagnose::{diagnose, DecryptDiagnosis, DiagnosticStage};
pub use envelope::{is_encrypted, Envelope, Segments};
pub use error::CryptoError;
pub use key::{validate_key_hex, SecretKey};
pub use types::{CURRENT_VERSION, SUPPORTED_VERSIONS};
pub use wrap::{generate_dek, unwrap_dek, wrap_dek};
