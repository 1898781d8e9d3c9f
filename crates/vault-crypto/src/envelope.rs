//! Textual ciphertext envelopes.
//!
//! Wire formats:
//! - current: `v1:base64(nonce):base64(ciphertext || tag)`
//! - legacy:  `base64(nonce):base64(ciphertext || tag)`
//!
//! Parsing yields a tagged union so a future version is one more variant.

use std::fmt;

use crate::base64::{base64_decode, base64_encode, is_base64_charset};
use crate::error::CryptoError;
use crate::types::{
    AES_GCM_NONCE_LENGTH, AES_GCM_TAG_LENGTH, CURRENT_VERSION, MIN_CIPHERTEXT_BASE64_LENGTH,
    NONCE_BASE64_LENGTH, SEGMENT_DELIMITER,
};

/// A parsed ciphertext envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// `v1:nonce:ciphertext`
    V1 {
        nonce: [u8; AES_GCM_NONCE_LENGTH],
        ciphertext: Vec<u8>,
    },
    /// `nonce:ciphertext`, written before the version prefix existed.
    Legacy {
        nonce: [u8; AES_GCM_NONCE_LENGTH],
        ciphertext: Vec<u8>,
    },
}

impl Envelope {
    /// Parse an envelope string. The version tag is inspected first; an
    /// unrecognized tag is an error, never a fallback to another format.
    pub fn parse(encoded: &str) -> Result<Self, CryptoError> {
        let segments = Segments::split(encoded)?;
        let (nonce, ciphertext) = decode_segments(segments.nonce, segments.ciphertext)?;
        Ok(match segments.version {
            Some(_) => Envelope::V1 { nonce, ciphertext },
            None => Envelope::Legacy { nonce, ciphertext },
        })
    }

    /// Build a current-version envelope.
    pub fn current(nonce: [u8; AES_GCM_NONCE_LENGTH], ciphertext: Vec<u8>) -> Self {
        Envelope::V1 { nonce, ciphertext }
    }

    /// Version tag, or `None` for the legacy shape.
    pub fn version(&self) -> Option<&'static str> {
        match self {
            Envelope::V1 { .. } => Some(CURRENT_VERSION),
            Envelope::Legacy { .. } => None,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Envelope::Legacy { .. })
    }

    pub fn nonce(&self) -> &[u8; AES_GCM_NONCE_LENGTH] {
        match self {
            Envelope::V1 { nonce, .. } | Envelope::Legacy { nonce, .. } => nonce,
        }
    }

    /// Ciphertext with the 16-byte tag appended.
    pub fn ciphertext(&self) -> &[u8] {
        match self {
            Envelope::V1 { ciphertext, .. } | Envelope::Legacy { ciphertext, .. } => ciphertext,
        }
    }

    /// Encode to the wire string.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nonce = base64_encode(self.nonce());
        let ciphertext = base64_encode(self.ciphertext());
        match self.version() {
            Some(version) => write!(f, "{version}:{nonce}:{ciphertext}"),
            None => write!(f, "{nonce}:{ciphertext}"),
        }
    }
}

/// The undecoded segments of an envelope string.
///
/// This is the only place that knows the segment layout and which version
/// tags exist; parsing, the structural check and diagnostics all start here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segments<'a> {
    /// `None` for the legacy two-segment shape.
    pub version: Option<&'static str>,
    pub nonce: &'a str,
    pub ciphertext: &'a str,
}

impl<'a> Segments<'a> {
    pub fn split(encoded: &'a str) -> Result<Self, CryptoError> {
        let parts: Vec<&str> = encoded.split(SEGMENT_DELIMITER).collect();
        match parts.as_slice() {
            [version, nonce, ciphertext] if *version == CURRENT_VERSION => Ok(Segments {
                version: Some(CURRENT_VERSION),
                nonce: *nonce,
                ciphertext: *ciphertext,
            }),
            [version, _, _] if version.starts_with('v') => {
                Err(CryptoError::UnsupportedVersion((*version).to_string()))
            }
            [nonce, ciphertext] => Ok(Segments {
                version: None,
                nonce: *nonce,
                ciphertext: *ciphertext,
            }),
            _ => Err(CryptoError::InvalidFormat(format!(
                "expected {CURRENT_VERSION}:nonce:ciphertext, got {} segments",
                parts.len()
            ))),
        }
    }

    /// `"v1"` or `"legacy"`.
    pub fn format(&self) -> &'static str {
        self.version.unwrap_or("legacy")
    }
}

fn decode_segments(
    nonce_b64: &str,
    ciphertext_b64: &str,
) -> Result<([u8; AES_GCM_NONCE_LENGTH], Vec<u8>), CryptoError> {
    let nonce_bytes = base64_decode(nonce_b64)?;
    let nonce: [u8; AES_GCM_NONCE_LENGTH] =
        nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidNonceLength {
                expected: AES_GCM_NONCE_LENGTH,
                got: nonce_bytes.len(),
            })?;
    let ciphertext = base64_decode(ciphertext_b64)?;
    if ciphertext.len() < AES_GCM_TAG_LENGTH {
        return Err(CryptoError::DataTooShort);
    }
    Ok((nonce, ciphertext))
}

/// Structural check: does `value` look like an envelope of either shape?
///
/// Segment lengths and character classes only; nothing is decoded. Used to
/// tell ciphertext apart from plaintext values written before encryption
/// was rolled out.
pub fn is_encrypted(value: &str) -> bool {
    let Ok(Segments { nonce, ciphertext, .. }) = Segments::split(value) else {
        return false;
    };
    nonce.len() == NONCE_BASE64_LENGTH
        && ciphertext.len() >= MIN_CIPHERTEXT_BASE64_LENGTH
        && is_base64_charset(nonce)
        && is_base64_charset(ciphertext)
}
