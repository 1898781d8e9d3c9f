//! Staged decryption diagnostics.
//!
//! Walks the same steps as [`crate::decrypt`] one at a time and reports the
//! first stage that fails. The report reveals which check failed, so it is
//! for development and operator tooling only and must not be returned from
//! a public API. It never carries the plaintext.

use serde::Serialize;

use crate::aes_gcm::open;
use crate::base64::{base64_decode, is_base64_charset};
use crate::envelope::{Envelope, Segments};
use crate::key::{validate_key_hex, SecretKey};
use crate::types::{AES_GCM_NONCE_LENGTH, NONCE_BASE64_LENGTH};

/// Where a diagnostic decrypt stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticStage {
    /// Segment count or version tag is wrong (truncated or corrupted data).
    Parse,
    /// Nonce segment has characters outside the base64 alphabet.
    NonceBase64,
    /// Ciphertext segment has characters outside the base64 alphabet.
    CiphertextBase64,
    /// Nonce segment is not 16 characters / 12 bytes.
    NonceLength,
    /// A segment failed to decode.
    Decode,
    /// Key is not 64 characters.
    KeyLength,
    /// Key contains a non-hex character.
    KeyFormat,
    /// Authentication failed: wrong key or modified data.
    Decrypt,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecryptDiagnosis {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<DiagnosticStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `"v1"` or `"legacy"` once the shape has been recognized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ciphertext_length: Option<usize>,
}

impl DecryptDiagnosis {
    fn failed(stage: DiagnosticStage, error: impl Into<String>, format: Option<&'static str>) -> Self {
        Self {
            success: false,
            stage: Some(stage),
            error: Some(error.into()),
            format,
            ciphertext_length: None,
        }
    }
}

/// Run a diagnostic decrypt of `encrypted` with a hex key.
pub fn diagnose(encrypted: &str, key_hex: &str) -> DecryptDiagnosis {
    let segments = match Segments::split(encrypted) {
        Ok(segments) => segments,
        Err(e) => return DecryptDiagnosis::failed(DiagnosticStage::Parse, e.to_string(), None),
    };
    let (nonce_b64, ciphertext_b64) = (segments.nonce, segments.ciphertext);
    let format = Some(segments.format());

    if !is_base64_charset(nonce_b64) {
        return DecryptDiagnosis::failed(
            DiagnosticStage::NonceBase64,
            "Nonce contains invalid base64 characters",
            format,
        );
    }
    if !is_base64_charset(ciphertext_b64) {
        return DecryptDiagnosis::failed(
            DiagnosticStage::CiphertextBase64,
            "Ciphertext contains invalid base64 characters",
            format,
        );
    }
    if nonce_b64.len() != NONCE_BASE64_LENGTH {
        return DecryptDiagnosis::failed(
            DiagnosticStage::NonceLength,
            format!(
                "Nonce has wrong base64 length: {} (expected {NONCE_BASE64_LENGTH})",
                nonce_b64.len()
            ),
            format,
        );
    }
    let nonce = match base64_decode(nonce_b64) {
        Ok(n) => n,
        Err(e) => return DecryptDiagnosis::failed(DiagnosticStage::Decode, e.to_string(), format),
    };
    if nonce.len() != AES_GCM_NONCE_LENGTH {
        return DecryptDiagnosis::failed(
            DiagnosticStage::NonceLength,
            format!("Decoded nonce has {} bytes (expected {AES_GCM_NONCE_LENGTH})", nonce.len()),
            format,
        );
    }
    if let Err(e) = base64_decode(ciphertext_b64) {
        return DecryptDiagnosis::failed(DiagnosticStage::Decode, e.to_string(), format);
    }

    if let Err(e) = validate_key_hex(key_hex) {
        let stage = if matches!(e, crate::CryptoError::InvalidKeyLength { .. }) {
            DiagnosticStage::KeyLength
        } else {
            DiagnosticStage::KeyFormat
        };
        return DecryptDiagnosis::failed(stage, e.to_string(), format);
    }
    let key = match SecretKey::from_hex(key_hex) {
        Ok(k) => k,
        Err(e) => return DecryptDiagnosis::failed(DiagnosticStage::KeyFormat, e.to_string(), format),
    };

    let envelope = match Envelope::parse(encrypted) {
        Ok(env) => env,
        Err(e) => return DecryptDiagnosis::failed(DiagnosticStage::Parse, e.to_string(), format),
    };
    match open(&envelope, &key) {
        Ok(_) => DecryptDiagnosis {
            success: true,
            stage: None,
            error: None,
            format,
            ciphertext_length: Some(envelope.ciphertext().len()),
        },
        Err(e) => DecryptDiagnosis {
            ciphertext_length: Some(envelope.ciphertext().len()),
            ..DecryptDiagnosis::failed(
                DiagnosticStage::Decrypt,
                format!("{e} (usually a wrong key or data modified after encryption)"),
                format,
            )
        },
    }
}
