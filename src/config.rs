//! Process configuration for the vault.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use vault_crypto::SecretKey;
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

pub const ENV_KEK: &str = "VAULT_KEK";
pub const ENV_LEGACY_KEY: &str = "VAULT_LEGACY_KEY";
pub const ENV_DEK_CACHE_CAPACITY: &str = "VAULT_DEK_CACHE_CAPACITY";
pub const ENV_DATABASE_PATH: &str = "VAULT_DATABASE_PATH";

pub const DEFAULT_DEK_CACHE_CAPACITY: usize = 1024;

/// Key material and tuning knobs. Hex strings are wiped on drop and never
/// printed by `Debug`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Master key-encryption key, 64 hex characters.
    pub kek_hex: Option<Zeroizing<String>>,
    /// Pre-envelope global key, only needed for migration.
    pub legacy_key_hex: Option<Zeroizing<String>>,
    pub dek_cache_capacity: usize,
    pub database_path: Option<PathBuf>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kek_hex: None,
            legacy_key_hex: None,
            dek_cache_capacity: DEFAULT_DEK_CACHE_CAPACITY,
            database_path: None,
        }
    }
}

impl VaultConfig {
    /// Read `VAULT_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any name → value lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let dek_cache_capacity = match get(ENV_DEK_CACHE_CAPACITY) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                VaultError::Configuration(format!(
                    "{ENV_DEK_CACHE_CAPACITY} must be a positive integer, got {raw:?}"
                ))
            })?,
            None => DEFAULT_DEK_CACHE_CAPACITY,
        };

        Ok(Self {
            kek_hex: get(ENV_KEK).map(Zeroizing::new),
            legacy_key_hex: get(ENV_LEGACY_KEY).map(Zeroizing::new),
            dek_cache_capacity,
            database_path: get(ENV_DATABASE_PATH).map(PathBuf::from),
        })
    }

    pub fn with_kek(mut self, kek_hex: impl Into<String>) -> Self {
        self.kek_hex = Some(Zeroizing::new(kek_hex.into()));
        self
    }

    pub fn with_legacy_key(mut self, legacy_key_hex: impl Into<String>) -> Self {
        self.legacy_key_hex = Some(Zeroizing::new(legacy_key_hex.into()));
        self
    }

    pub fn with_dek_cache_capacity(mut self, capacity: usize) -> Self {
        self.dek_cache_capacity = capacity;
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Parse the master key. A missing key is a configuration error; a
    /// malformed one is a validation error.
    pub fn master_key(&self) -> Result<SecretKey> {
        let hex = self.kek_hex.as_deref().ok_or_else(|| {
            VaultError::Configuration(format!(
                "{ENV_KEK} is not set; generate one with `openssl rand -hex 32`"
            ))
        })?;
        Ok(SecretKey::from_hex(hex.trim())?)
    }

    /// Parse the legacy global key used by the pre-envelope scheme.
    pub fn legacy_key(&self) -> Result<SecretKey> {
        let hex = self.legacy_key_hex.as_deref().ok_or_else(|| {
            VaultError::Configuration(format!("{ENV_LEGACY_KEY} is not set"))
        })?;
        Ok(SecretKey::from_hex(hex.trim())?)
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<Zeroizing<String>>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("VaultConfig")
            .field("kek_hex", &redact(&self.kek_hex))
            .field("legacy_key_hex", &redact(&self.legacy_key_hex))
            .field("dek_cache_capacity", &self.dek_cache_capacity)
            .field("database_path", &self.database_path)
            .finish()
    }
}
