//! Tenant vault: per-tenant secret storage with envelope encryption.
//!
//! A master KEK wraps one random DEK per tenant; secret values are encrypted
//! under their tenant's DEK. DEKs can be rotated in place and values written
//! under the old global key can be migrated.

pub mod config;
pub mod error;
pub mod keys;
pub mod migration;
pub mod rotation;
pub mod storage;
pub mod store;
pub mod types;

pub use config::VaultConfig;
pub use error::{Result, StorageError, StorageResult, VaultError};
pub use keys::{KeyHierarchy, TenantDek, TenantGuard};
pub use migration::{
    MigrationEntry, MigrationMode, MigrationReport, Migrator, RowOutcome, SkipReason,
};
pub use rotation::rotate_tenant_dek;
pub use storage::{MemoryBackend, SecretBackend, WriteOp};
#[cfg(feature = "sqlite")]
pub use storage::SqliteBackend;
pub use store::SecretStore;
pub use types::{
    DekStatus, EncryptedSecret, RotationReport, SecretMetadata, StoredSecretRef, TenantId,
};

pub use vault_crypto as crypto;
