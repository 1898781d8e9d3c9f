//! Persistence interface consumed by the key hierarchy and the secret store.
//!
//! Logical schema:
//! ```text
//! tenant_keys(tenant_id PK, encrypted_dek NULLABLE)
//! tenant_secrets(tenant_id, key_name, encrypted_value, created_at, updated_at,
//!                PRIMARY KEY(tenant_id, key_name))
//! ```
//!
//! Backends must provide three primitives beyond plain reads and writes:
//! an insert-if-absent for a tenant's first wrapped DEK, an atomic batch
//! commit, and compare-and-swap conditions inside that batch. A batch either
//! applies every op or none of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::types::{EncryptedSecret, SecretMetadata, StoredSecretRef, TenantId};

/// One statement of an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Overwrite an existing secret, only if its stored ciphertext still
    /// equals `expected`. Otherwise the whole batch fails with
    /// `StorageError::Conflict`.
    ReplaceSecret {
        tenant_id: TenantId,
        key_name: String,
        expected: String,
        encrypted_value: String,
        updated_at: DateTime<Utc>,
    },
    /// Swap the tenant's wrapped DEK, only if it still equals `expected`.
    ReplaceWrappedDek {
        tenant_id: TenantId,
        expected: String,
        wrapped_dek: String,
    },
    /// Delete every secret row of a tenant. Reports the number of rows removed.
    DeleteTenantSecrets { tenant_id: TenantId },
    /// Set the tenant's wrapped DEK to NULL.
    ClearWrappedDek { tenant_id: TenantId },
}

/// Storage backend for tenant keys and secrets.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Wrapped DEK of a tenant. `None` when no row exists or the column is NULL.
    async fn get_wrapped_dek(&self, tenant_id: &TenantId) -> StorageResult<Option<String>>;

    /// Store `wrapped_dek` unless the tenant already has one.
    ///
    /// Returns `true` if this call's value was stored, `false` if another
    /// writer got there first. Must be a single conditional write, never a
    /// read followed by a write.
    async fn insert_wrapped_dek_if_absent(
        &self,
        tenant_id: &TenantId,
        wrapped_dek: &str,
    ) -> StorageResult<bool>;

    async fn get_secret(
        &self,
        tenant_id: &TenantId,
        key_name: &str,
    ) -> StorageResult<Option<EncryptedSecret>>;

    /// Existence check. Must not read or compare the stored value.
    async fn secret_exists(&self, tenant_id: &TenantId, key_name: &str) -> StorageResult<bool>;

    /// Upsert: insert with `created_at = updated_at = now`, or overwrite the
    /// value and bump `updated_at`.
    async fn put_secret(
        &self,
        tenant_id: &TenantId,
        key_name: &str,
        encrypted_value: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Returns whether a row was removed.
    async fn delete_secret(&self, tenant_id: &TenantId, key_name: &str) -> StorageResult<bool>;

    /// Metadata for every secret of a tenant, ordered by key name.
    async fn list_secrets(&self, tenant_id: &TenantId) -> StorageResult<Vec<SecretMetadata>>;

    /// Every encrypted secret of a tenant, ordered by key name.
    async fn scan_secrets(&self, tenant_id: &TenantId) -> StorageResult<Vec<EncryptedSecret>>;

    /// Every secret row across all tenants, ordered by tenant then key.
    async fn scan_all_secrets(&self) -> StorageResult<Vec<StoredSecretRef>>;

    /// Apply `ops` atomically. Returns the number of rows each op touched.
    async fn commit_batch(&self, ops: Vec<WriteOp>) -> StorageResult<Vec<usize>>;

    /// Names of required tables/columns that do not exist yet.
    async fn missing_schema_objects(&self) -> StorageResult<Vec<String>>;
}
