/// Version tag written in front of every envelope produced by `encrypt`.
///
/// Format: `v1:base64(nonce):base64(ciphertext || tag)`
/// The legacy format is the same without the version segment.
pub const CURRENT_VERSION: &str = "v1";

/// Version tags accepted by the parser (the unversioned legacy shape is
/// handled separately).
pub const SUPPORTED_VERSIONS: &[&str] = &[CURRENT_VERSION];

/// AES-GCM nonce length in bytes (96 bits per NIST recommendation).
pub const AES_GCM_NONCE_LENGTH: usize = 12;

/// AES-GCM tag length in bytes (128 bits).
pub const AES_GCM_TAG_LENGTH: usize = 16;

/// AES key length in bytes (256 bits).
pub const AES_KEY_LENGTH: usize = 32;

/// Hex characters needed to spell a 256-bit key.
pub const KEY_HEX_LENGTH: usize = AES_KEY_LENGTH * 2;

/// Padded base64 length of a 12-byte nonce.
pub const NONCE_BASE64_LENGTH: usize = 16;

/// Shortest ciphertext segment: a bare 16-byte tag encodes to 24 characters.
pub const MIN_CIPHERTEXT_BASE64_LENGTH: usize = 24;

/// Segment delimiter of the textual wire format.
pub const SEGMENT_DELIMITER: char = ':';
