use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an isolated tenant. All key material and secret rows are
/// partitioned by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Secret metadata returned by listings. Never carries the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretMetadata {
    pub key_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An encrypted secret row as read back for one tenant.
///
/// Carries no tenant id: the key used to decrypt it always comes from the
/// tenant named by the caller of the read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub key_name: String,
    pub encrypted_value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A secret row from a cross-tenant scan (migration only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSecretRef {
    pub tenant_id: TenantId,
    pub key_name: String,
    pub encrypted_value: String,
}

/// Outcome of rotating one tenant's DEK.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    /// Secrets re-encrypted under the new DEK.
    pub rotated: usize,
    /// Secrets that could not be decrypted under the old DEK. Left untouched.
    pub failed: Vec<String>,
}

/// Diagnostic view of a tenant's wrapped DEK. Never includes the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DekStatus {
    pub exists: bool,
    pub can_decrypt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
