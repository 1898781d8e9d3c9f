//! KEK → per-tenant DEK hierarchy.
//!
//! The KEK never touches a secret value. It only wraps and unwraps tenant
//! DEKs, which live in storage wrapped and in the cache unwrapped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};
use vault_crypto::{decrypt, encrypt, generate_dek, unwrap_dek, wrap_dek, SecretKey};

use crate::config::VaultConfig;
use crate::error::{Result, StorageError, VaultError};
use crate::storage::SecretBackend;
use crate::types::{DekStatus, TenantId};

use super::cache::DekCache;

/// An unwrapped DEK bound to the tenant it was loaded for.
///
/// Only the key hierarchy can produce one, and only for a given tenant id,
/// so a secret can never be decrypted with another tenant's key.
pub struct TenantDek {
    tenant: TenantId,
    key: SecretKey,
}

impl TenantDek {
    pub(crate) fn generate(tenant: &TenantId) -> Result<Self> {
        Ok(Self {
            tenant: tenant.clone(),
            key: generate_dek()?,
        })
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub(crate) fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(encrypt(plaintext, &self.key)?)
    }

    pub(crate) fn decrypt(&self, encrypted: &str) -> Result<String> {
        Ok(decrypt(encrypted, &self.key)?)
    }

    /// Whether both handles hold the same key bytes.
    pub fn same_key_as(&self, other: &TenantDek) -> bool {
        self.key == other.key
    }
}

impl fmt::Debug for TenantDek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantDek")
            .field("tenant", &self.tenant)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

enum GateGuard {
    Shared(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Exclusive(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

type GateMap = Arc<Mutex<HashMap<TenantId, Arc<RwLock<()>>>>>;

/// Proof that the caller holds a tenant's rotation gate.
///
/// Reads and writes hold it shared; rotation and delete-all hold it
/// exclusively. Dropping the guard releases the gate, and removes it from
/// the gate map when no other task holds or waits on it.
pub struct TenantGuard {
    tenant: TenantId,
    gate: Arc<RwLock<()>>,
    gates: GateMap,
    // None while still waiting for the lock.
    guard: Option<GateGuard>,
}

impl TenantGuard {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self.guard, Some(GateGuard::Exclusive(_)))
    }
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        self.guard = None;
        // Gate clones are only handed out under the map lock, so a count of
        // two (map + self) cannot grow while we hold it.
        let mut gates = self.gates.lock();
        let unused = Arc::strong_count(&self.gate) == 2
            && gates
                .get(&self.tenant)
                .is_some_and(|gate| Arc::ptr_eq(gate, &self.gate));
        if unused {
            gates.remove(&self.tenant);
        }
    }
}

/// Loads, creates, caches and rotates tenant DEKs.
pub struct KeyHierarchy {
    kek: SecretKey,
    backend: Arc<dyn SecretBackend>,
    cache: Mutex<DekCache>,
    gates: GateMap,
}

impl KeyHierarchy {
    /// Validates `kek_hex` eagerly; a malformed KEK fails here, not on first use.
    pub fn new(kek_hex: &str, backend: Arc<dyn SecretBackend>, cache_capacity: usize) -> Result<Self> {
        Ok(Self::with_key(SecretKey::from_hex(kek_hex)?, backend, cache_capacity))
    }

    pub fn with_key(kek: SecretKey, backend: Arc<dyn SecretBackend>, cache_capacity: usize) -> Self {
        Self {
            kek,
            backend,
            cache: Mutex::new(DekCache::new(cache_capacity)),
            gates: GateMap::default(),
        }
    }

    pub fn from_config(config: &VaultConfig, backend: Arc<dyn SecretBackend>) -> Result<Self> {
        Ok(Self::with_key(
            config.master_key()?,
            backend,
            config.dek_cache_capacity,
        ))
    }

    pub fn backend(&self) -> &Arc<dyn SecretBackend> {
        &self.backend
    }

    // ------------------------------------------------------------------------
    // Gates
    // ------------------------------------------------------------------------

    /// Unlocked guard on the tenant's gate. If the caller is cancelled while
    /// waiting for the lock, dropping it still prunes the map.
    fn pending_guard(&self, tenant: &TenantId) -> TenantGuard {
        let gate = Arc::clone(self.gates.lock().entry(tenant.clone()).or_default());
        TenantGuard {
            tenant: tenant.clone(),
            gate,
            gates: Arc::clone(&self.gates),
            guard: None,
        }
    }

    /// Shared guard for a read or a write. Waits while the tenant is being
    /// rotated.
    ///
    /// The gate is fair: never take it again while already holding it.
    pub async fn write_gate(&self, tenant: &TenantId) -> TenantGuard {
        let mut pending = self.pending_guard(tenant);
        let guard = Arc::clone(&pending.gate).read_owned().await;
        pending.guard = Some(GateGuard::Shared(guard));
        pending
    }

    /// Exclusive guard for a rotation or a delete-all.
    pub async fn rotation_gate(&self, tenant: &TenantId) -> TenantGuard {
        let mut pending = self.pending_guard(tenant);
        let guard = Arc::clone(&pending.gate).write_owned().await;
        pending.guard = Some(GateGuard::Exclusive(guard));
        pending
    }

    /// Tenants that currently have a gate, held or awaited.
    pub fn gate_count(&self) -> usize {
        self.gates.lock().len()
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// DEK of a tenant, created on first use.
    ///
    /// Creation stores the wrapped key with an insert-if-absent write before
    /// anything is encrypted under it. A caller that loses the race to create
    /// the first DEK adopts the stored winner, so a tenant only ever has one.
    pub async fn tenant_key_or_create(&self, tenant: &TenantId) -> Result<TenantDek> {
        let guard = self.write_gate(tenant).await;
        self.key_for_write(&guard).await
    }

    /// Same as [`tenant_key_or_create`](Self::tenant_key_or_create), for a
    /// caller that already holds the tenant's gate.
    pub async fn key_for_write(&self, guard: &TenantGuard) -> Result<TenantDek> {
        let tenant = guard.tenant();
        if let Some(dek) = self.cached(tenant) {
            return Ok(dek);
        }
        if let Some(wrapped) = self.backend.get_wrapped_dek(tenant).await? {
            return self.unwrap_and_cache(tenant, &wrapped);
        }

        let dek = TenantDek::generate(tenant)?;
        let wrapped = self.wrap(&dek)?;
        if self.backend.insert_wrapped_dek_if_absent(tenant, &wrapped).await? {
            info!(tenant = %tenant, "created tenant DEK");
            self.cache.lock().insert(tenant.clone(), dek.key.clone());
            return Ok(dek);
        }

        debug!(tenant = %tenant, "another writer created the DEK first, adopting it");
        let stored = self.backend.get_wrapped_dek(tenant).await?.ok_or_else(|| {
            StorageError::Conflict(format!("DEK of tenant {tenant} vanished during creation"))
        })?;
        self.unwrap_and_cache(tenant, &stored)
    }

    /// DEK of a tenant for a read. Never creates one.
    ///
    /// Fails with [`VaultError::NotFound`] when the tenant has no wrapped DEK.
    pub async fn tenant_key(&self, tenant: &TenantId) -> Result<TenantDek> {
        let guard = self.write_gate(tenant).await;
        self.key_for_read(&guard).await
    }

    /// Same as [`tenant_key`](Self::tenant_key), for a caller that already
    /// holds the tenant's gate.
    ///
    /// A caller that read a ciphertext under the same guard gets the DEK it
    /// was written with: rotation cannot cut over in between.
    pub async fn key_for_read(&self, guard: &TenantGuard) -> Result<TenantDek> {
        let tenant = guard.tenant();
        if let Some(dek) = self.cached(tenant) {
            return Ok(dek);
        }
        match self.backend.get_wrapped_dek(tenant).await? {
            Some(wrapped) => self.unwrap_and_cache(tenant, &wrapped),
            None => Err(VaultError::NotFound {
                tenant: tenant.to_string(),
            }),
        }
    }

    /// Current DEK read fresh from storage, with its wrapped form as stored.
    ///
    /// The wrapped string is the compare-and-swap guard for the rotation
    /// commit. A tenant with no DEK gets one first.
    pub async fn load_for_rotation(&self, guard: &TenantGuard) -> Result<(TenantDek, String)> {
        let tenant = guard.tenant();
        let wrapped = match self.backend.get_wrapped_dek(tenant).await? {
            Some(wrapped) => wrapped,
            None => {
                self.key_for_write(guard).await?;
                self.backend.get_wrapped_dek(tenant).await?.ok_or_else(|| {
                    StorageError::Conflict(format!("DEK of tenant {tenant} vanished during creation"))
                })?
            }
        };
        let dek = self.unwrap(tenant, &wrapped)?;
        Ok((dek, wrapped))
    }

    /// Diagnostic check of a tenant's stored DEK. Never returns key material.
    pub async fn inspect_tenant_key(&self, tenant: &TenantId) -> Result<DekStatus> {
        let status = match self.backend.get_wrapped_dek(tenant).await? {
            None => DekStatus {
                exists: false,
                can_decrypt: false,
                error: None,
            },
            Some(wrapped) => match self.unwrap(tenant, &wrapped) {
                Ok(_) => DekStatus {
                    exists: true,
                    can_decrypt: true,
                    error: None,
                },
                Err(err) => DekStatus {
                    exists: true,
                    can_decrypt: false,
                    error: Some(err.to_string()),
                },
            },
        };
        Ok(status)
    }

    // ------------------------------------------------------------------------
    // Cache management
    // ------------------------------------------------------------------------

    /// Wrap a DEK with the KEK for storage.
    pub fn wrap(&self, dek: &TenantDek) -> Result<String> {
        Ok(wrap_dek(&dek.key, &self.kek)?)
    }

    /// Make `dek` the tenant's cached key. Called after a rotation commit.
    pub fn install(&self, guard: &TenantGuard, dek: &TenantDek) {
        self.cache.lock().insert(guard.tenant().clone(), dek.key.clone());
    }

    /// Drop a tenant's cached DEK.
    pub fn evict(&self, tenant: &TenantId) {
        self.cache.lock().remove(tenant);
        self.prune_gate(tenant);
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        self.gates.lock().retain(|_, gate| Arc::strong_count(gate) > 1);
    }

    pub fn is_cached(&self, tenant: &TenantId) -> bool {
        self.cache.lock().contains(tenant)
    }

    pub fn cached_tenants(&self) -> Vec<TenantId> {
        self.cache.lock().tenants()
    }

    fn cached(&self, tenant: &TenantId) -> Option<TenantDek> {
        self.cache.lock().get(tenant).map(|key| TenantDek {
            tenant: tenant.clone(),
            key,
        })
    }

    fn unwrap(&self, tenant: &TenantId, wrapped: &str) -> Result<TenantDek> {
        let key = unwrap_dek(wrapped, &self.kek).map_err(|err| {
            VaultError::Decryption(format!("cannot unwrap DEK of tenant {tenant}: {err}"))
        })?;
        Ok(TenantDek {
            tenant: tenant.clone(),
            key,
        })
    }

    fn unwrap_and_cache(&self, tenant: &TenantId, wrapped: &str) -> Result<TenantDek> {
        let dek = self.unwrap(tenant, wrapped)?;
        self.cache.lock().insert(tenant.clone(), dek.key.clone());
        Ok(dek)
    }

    fn prune_gate(&self, tenant: &TenantId) {
        let mut gates = self.gates.lock();
        if gates.get(tenant).is_some_and(|gate| Arc::strong_count(gate) == 1) {
            gates.remove(tenant);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
