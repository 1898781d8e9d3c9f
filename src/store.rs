//! Tenant-scoped secret store.
//!
//! Values are encrypted under the tenant's DEK before they reach storage.
//! Every decrypt takes its key from the tenant id the caller passed in,
//! never from anything stored alongside the row.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use vault_crypto::{decrypt, is_encrypted, SecretKey};
use zeroize::Zeroizing;

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::keys::KeyHierarchy;
use crate::rotation;
use crate::storage::{SecretBackend, WriteOp};
use crate::types::{DekStatus, RotationReport, SecretMetadata, TenantId};

pub struct SecretStore {
    keys: Arc<KeyHierarchy>,
}

impl SecretStore {
    pub fn new(keys: Arc<KeyHierarchy>) -> Self {
        Self { keys }
    }

    /// Build a store and its key hierarchy from configuration.
    pub fn open(config: &VaultConfig, backend: Arc<dyn SecretBackend>) -> Result<Self> {
        Ok(Self::new(Arc::new(KeyHierarchy::from_config(config, backend)?)))
    }

    pub fn keys(&self) -> &Arc<KeyHierarchy> {
        &self.keys
    }

    fn backend(&self) -> &Arc<dyn SecretBackend> {
        self.keys.backend()
    }

    /// Encrypt and upsert a secret. Creates the tenant's DEK on first write.
    pub async fn set_secret(&self, tenant: &TenantId, key_name: &str, plaintext: &str) -> Result<()> {
        let guard = self.keys.write_gate(tenant).await;
        let dek = self.keys.key_for_write(&guard).await?;
        let encrypted = dek.encrypt(plaintext)?;
        self.backend()
            .put_secret(tenant, key_name, &encrypted, Utc::now())
            .await?;
        debug!(tenant = %tenant, key = key_name, "stored secret");
        Ok(())
    }

    /// Decrypt a secret.
    ///
    /// `None` only when no row exists. A row that fails to decrypt is an
    /// error, never a silent `None`.
    pub async fn get_secret(&self, tenant: &TenantId, key_name: &str) -> Result<Option<String>> {
        // Row and DEK must come from the same side of a rotation.
        let guard = self.keys.write_gate(tenant).await;
        let Some(row) = self.backend().get_secret(tenant, key_name).await? else {
            return Ok(None);
        };
        let dek = self.keys.key_for_read(&guard).await?;
        dek.decrypt(&row.encrypted_value).map(Some)
    }

    /// Degraded read: any failure is logged and reported as `None`.
    pub async fn safe_get_secret(&self, tenant: &TenantId, key_name: &str) -> Option<String> {
        match self.get_secret(tenant, key_name).await {
            Ok(value) => value,
            Err(err) => {
                warn!(tenant = %tenant, key = key_name, error = %err, "failed to read secret");
                None
            }
        }
    }

    /// Existence check. Does not decrypt.
    pub async fn has_secret(&self, tenant: &TenantId, key_name: &str) -> Result<bool> {
        Ok(self.backend().secret_exists(tenant, key_name).await?)
    }

    pub async fn delete_secret(&self, tenant: &TenantId, key_name: &str) -> Result<bool> {
        let _guard = self.keys.write_gate(tenant).await;
        let deleted = self.backend().delete_secret(tenant, key_name).await?;
        if deleted {
            debug!(tenant = %tenant, key = key_name, "deleted secret");
        }
        Ok(deleted)
    }

    /// Delete every secret of a tenant and its wrapped DEK in one batch.
    ///
    /// Returns the number of secrets removed.
    pub async fn delete_all_secrets(&self, tenant: &TenantId) -> Result<usize> {
        let guard = self.keys.rotation_gate(tenant).await;
        let affected = self
            .backend()
            .commit_batch(vec![
                WriteOp::DeleteTenantSecrets {
                    tenant_id: tenant.clone(),
                },
                WriteOp::ClearWrappedDek {
                    tenant_id: tenant.clone(),
                },
            ])
            .await?;
        self.keys.evict(guard.tenant());
        let deleted = affected.first().copied().unwrap_or(0);
        info!(tenant = %tenant, deleted, "deleted all tenant secrets and key material");
        Ok(deleted)
    }

    /// Metadata of a tenant's secrets, ordered by key name.
    pub async fn list_secrets(&self, tenant: &TenantId) -> Result<Vec<SecretMetadata>> {
        Ok(self.backend().list_secrets(tenant).await?)
    }

    pub async fn rotate_tenant_dek(&self, tenant: &TenantId) -> Result<RotationReport> {
        rotation::rotate_tenant_dek(&self.keys, tenant).await
    }

    pub async fn inspect_tenant_key(&self, tenant: &TenantId) -> Result<DekStatus> {
        self.keys.inspect_tenant_key(tenant).await
    }

    /// Decrypt a value written under the legacy global key and store it
    /// again under the tenant's DEK. Returns the plaintext.
    pub async fn migrate_secret(
        &self,
        tenant: &TenantId,
        key_name: &str,
        legacy_envelope: &str,
        legacy_key: &SecretKey,
    ) -> Result<String> {
        let plaintext = decrypt(legacy_envelope, legacy_key)?;
        self.set_secret(tenant, key_name, &plaintext).await?;
        info!(tenant = %tenant, key = key_name, "migrated secret from legacy key");
        Ok(plaintext)
    }

    /// Read a secret, migrating it from the legacy key on the fly when it
    /// was never moved to the envelope scheme.
    pub async fn get_secret_or_migrate(
        &self,
        tenant: &TenantId,
        key_name: &str,
        legacy_key: &SecretKey,
    ) -> Result<Option<String>> {
        let err = match self.get_secret(tenant, key_name).await {
            Ok(value) => return Ok(value),
            Err(err @ (VaultError::Decryption(_) | VaultError::NotFound { .. })) => err,
            Err(err) => return Err(err),
        };

        let Some(row) = self.backend().get_secret(tenant, key_name).await? else {
            return Ok(None);
        };
        if !is_encrypted(&row.encrypted_value) {
            return Err(err);
        }
        match decrypt(&row.encrypted_value, legacy_key) {
            Ok(plaintext) => {
                let plaintext = Zeroizing::new(plaintext);
                self.set_secret(tenant, key_name, &plaintext).await?;
                info!(tenant = %tenant, key = key_name, "migrated secret on read");
                Ok(Some(plaintext.to_string()))
            }
            Err(_) => Err(err),
        }
    }
}
