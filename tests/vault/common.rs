use std::sync::Arc;

use tenant_vault::crypto::{self, SecretKey};
use tenant_vault::{MemoryBackend, SecretStore, SqliteBackend, VaultConfig};

pub const KEK: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
pub const OTHER_KEK: &str = "60303ae22b998861bce3b28f33eec1be758a213c86c93c076dbe9f558c11c752";
pub const LEGACY_KEY: &str = "fd61a03af4f77d870fc21e05e7e80678095c92d808cfb3b5c279ee04c74aca13";

pub fn memory_store() -> (Arc<MemoryBackend>, SecretStore) {
    let backend = Arc::new(MemoryBackend::new());
    let store = SecretStore::open(&config(), backend.clone()).expect("open store");
    (backend, store)
}

pub fn sqlite_store() -> (Arc<SqliteBackend>, SecretStore) {
    let backend = SqliteBackend::open_in_memory().expect("open in-memory SQLite");
    backend.initialize().expect("create schema");
    let backend = Arc::new(backend);
    let store = SecretStore::open(&config(), backend.clone()).expect("open store");
    (backend, store)
}

pub fn config() -> VaultConfig {
    VaultConfig::default().with_kek(KEK).with_dek_cache_capacity(64)
}

pub fn legacy_key() -> SecretKey {
    SecretKey::from_hex(LEGACY_KEY).expect("legacy key")
}

/// A value as the pre-envelope scheme wrote it: `nonce:ciphertext`, no version tag.
pub fn legacy_encrypt(plaintext: &str) -> String {
    let v1 = crypto::encrypt(plaintext, &legacy_key()).expect("encrypt");
    v1.strip_prefix("v1:").expect("v1 envelope").to_string()
}
