//! MemoryBackend: a SecretBackend that holds all rows in process memory.
//!
//! Batches are applied to a buffered copy of the state and swapped in only
//! when every op succeeded, so a failed batch leaves nothing behind.
//!
//! Interior mutability via `parking_lot::Mutex`; no lock is held across an
//! await point.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{StorageError, StorageResult};
use crate::types::{EncryptedSecret, SecretMetadata, StoredSecretRef, TenantId};

use super::traits::{SecretBackend, WriteOp};

#[derive(Debug, Clone)]
struct SecretRow {
    encrypted_value: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct State {
    /// tenant → wrapped DEK (None = cleared)
    tenant_keys: HashMap<TenantId, Option<String>>,
    /// (tenant, key name) → row. Ordered for deterministic scans.
    secrets: BTreeMap<(TenantId, String), SecretRow>,
}

impl State {
    fn apply(&mut self, op: WriteOp) -> StorageResult<usize> {
        match op {
            WriteOp::ReplaceSecret {
                tenant_id,
                key_name,
                expected,
                encrypted_value,
                updated_at,
            } => {
                let row = self
                    .secrets
                    .get_mut(&(tenant_id.clone(), key_name.clone()))
                    .filter(|row| row.encrypted_value == expected)
                    .ok_or_else(|| {
                        StorageError::Conflict(format!(
                            "secret {tenant_id}/{key_name} changed during the batch"
                        ))
                    })?;
                row.encrypted_value = encrypted_value;
                row.updated_at = updated_at;
                Ok(1)
            }
            WriteOp::ReplaceWrappedDek {
                tenant_id,
                expected,
                wrapped_dek,
            } => match self.tenant_keys.get_mut(&tenant_id) {
                Some(slot) if slot.as_deref() == Some(expected.as_str()) => {
                    *slot = Some(wrapped_dek);
                    Ok(1)
                }
                _ => Err(StorageError::Conflict(format!(
                    "wrapped DEK of tenant {tenant_id} changed during the batch"
                ))),
            },
            WriteOp::DeleteTenantSecrets { tenant_id } => {
                let before = self.secrets.len();
                self.secrets.retain(|(tenant, _), _| *tenant != tenant_id);
                Ok(before - self.secrets.len())
            }
            WriteOp::ClearWrappedDek { tenant_id } => match self.tenant_keys.get_mut(&tenant_id) {
                Some(slot) => {
                    *slot = None;
                    Ok(1)
                }
                None => Ok(0),
            },
        }
    }
}

/// In-memory storage backend.
///
/// Every batch commit clones the whole state, so this suits tests and small
/// datasets, not large ones.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    /// When set, every batch fails after its ops were applied to the buffer,
    /// exercising the rollback path.
    fail_commits: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `commit_batch` calls fail (or succeed again).
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of secret rows across all tenants.
    pub fn secret_count(&self) -> usize {
        self.state.lock().secrets.len()
    }
}

#[async_trait]
impl SecretBackend for MemoryBackend {
    async fn get_wrapped_dek(&self, tenant_id: &TenantId) -> StorageResult<Option<String>> {
        Ok(self.state.lock().tenant_keys.get(tenant_id).cloned().flatten())
    }

    async fn insert_wrapped_dek_if_absent(
        &self,
        tenant_id: &TenantId,
        wrapped_dek: &str,
    ) -> StorageResult<bool> {
        let mut state = self.state.lock();
        let slot = state.tenant_keys.entry(tenant_id.clone()).or_insert(None);
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(wrapped_dek.to_string());
        Ok(true)
    }

    async fn get_secret(
        &self,
        tenant_id: &TenantId,
        key_name: &str,
    ) -> StorageResult<Option<EncryptedSecret>> {
        let state = self.state.lock();
        Ok(state
            .secrets
            .get(&(tenant_id.clone(), key_name.to_string()))
            .map(|row| EncryptedSecret {
                key_name: key_name.to_string(),
                encrypted_value: row.encrypted_value.clone(),
                created_at: row.created_at,
                updated_at: row.updated_at,
            }))
    }

    async fn secret_exists(&self, tenant_id: &TenantId, key_name: &str) -> StorageResult<bool> {
        Ok(self
            .state
            .lock()
            .secrets
            .contains_key(&(tenant_id.clone(), key_name.to_string())))
    }

    async fn put_secret(
        &self,
        tenant_id: &TenantId,
        key_name: &str,
        encrypted_value: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut state = self.state.lock();
        state
            .secrets
            .entry((tenant_id.clone(), key_name.to_string()))
            .and_modify(|row| {
                row.encrypted_value = encrypted_value.to_string();
                row.updated_at = now;
            })
            .or_insert_with(|| SecretRow {
                encrypted_value: encrypted_value.to_string(),
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn delete_secret(&self, tenant_id: &TenantId, key_name: &str) -> StorageResult<bool> {
        Ok(self
            .state
            .lock()
            .secrets
            .remove(&(tenant_id.clone(), key_name.to_string()))
            .is_some())
    }

    async fn list_secrets(&self, tenant_id: &TenantId) -> StorageResult<Vec<SecretMetadata>> {
        let state = self.state.lock();
        Ok(state
            .secrets
            .iter()
            .filter(|((tenant, _), _)| tenant == tenant_id)
            .map(|((_, key_name), row)| SecretMetadata {
                key_name: key_name.clone(),
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }

    async fn scan_secrets(&self, tenant_id: &TenantId) -> StorageResult<Vec<EncryptedSecret>> {
        let state = self.state.lock();
        Ok(state
            .secrets
            .iter()
            .filter(|((tenant, _), _)| tenant == tenant_id)
            .map(|((_, key_name), row)| EncryptedSecret {
                key_name: key_name.clone(),
                encrypted_value: row.encrypted_value.clone(),
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }

    async fn scan_all_secrets(&self) -> StorageResult<Vec<StoredSecretRef>> {
        let state = self.state.lock();
        Ok(state
            .secrets
            .iter()
            .map(|((tenant, key_name), row)| StoredSecretRef {
                tenant_id: tenant.clone(),
                key_name: key_name.clone(),
                encrypted_value: row.encrypted_value.clone(),
            })
            .collect())
    }

    async fn commit_batch(&self, ops: Vec<WriteOp>) -> StorageResult<Vec<usize>> {
        let mut state = self.state.lock();

        // Apply to a buffer; the live state is only replaced on success.
        let mut buffer = state.clone();
        let mut affected = Vec::with_capacity(ops.len());
        for op in ops {
            affected.push(buffer.apply(op)?);
        }

        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StorageError::Transaction {
                message: "commit rejected by backend".to_string(),
                source: None,
            });
        }

        *state = buffer;
        Ok(affected)
    }

    async fn missing_schema_objects(&self) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Tests
// ============================================================================
