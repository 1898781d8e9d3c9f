use base64ct::{Base64, Encoding};

use crate::error::CryptoError;

/// Standard (padded) base64 encode, as used by the envelope wire format.
pub fn base64_encode(data: &[u8]) -> String {
    Base64::encode_string(data)
}

/// Standard (padded) base64 decode.
pub fn base64_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    Base64::decode_vec(s).map_err(|e| CryptoError::Base64Decode(e.to_string()))
}

/// Whether every character belongs to the standard base64 alphabet
/// (including `=` padding).
pub fn is_base64_charset(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=')
}
