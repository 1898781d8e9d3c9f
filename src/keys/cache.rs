//! Bounded cache of unwrapped tenant DEKs.

use std::collections::HashMap;

use vault_crypto::SecretKey;

use crate::types::TenantId;

struct Entry {
    key: SecretKey,
    last_used: u64,
}

/// Tenant → DEK cache with least-recently-used eviction.
///
/// Keys are `SecretKey`s, which zeroize themselves when dropped, so an
/// evicted or replaced entry leaves no key bytes behind.
pub struct DekCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<TenantId, Entry>,
}

impl DekCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, tenant: &TenantId) -> bool {
        self.entries.contains_key(tenant)
    }

    /// Look up a DEK and mark it as recently used.
    pub fn get(&mut self, tenant: &TenantId) -> Option<SecretKey> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(tenant).map(|entry| {
            entry.last_used = tick;
            entry.key.clone()
        })
    }

    /// Insert or replace a tenant's DEK, evicting the least recently used
    /// entry when full.
    pub fn insert(&mut self, tenant: TenantId, key: SecretKey) {
        self.tick += 1;
        if !self.entries.contains_key(&tenant) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            tenant,
            Entry {
                key,
                last_used: self.tick,
            },
        );
    }

    pub fn remove(&mut self, tenant: &TenantId) -> bool {
        self.entries.remove(tenant).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cached tenants, in no particular order.
    pub fn tenants(&self) -> Vec<TenantId> {
        self.entries.keys().cloned().collect()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(tenant, _)| tenant.clone());
        if let Some(tenant) = oldest {
            tracing::debug!(tenant = %tenant, "evicting DEK from cache");
            self.entries.remove(&tenant);
        }
    }
}

impl Drop for DekCache {
    fn drop(&mut self) {
        self.entries.clear();
    }
}
