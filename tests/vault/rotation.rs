use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tenant_vault::{
    EncryptedSecret, MemoryBackend, SecretBackend, SecretMetadata, SecretStore, StorageResult,
    StoredSecretRef, TenantId, WriteOp,
};

use crate::common::{config, memory_store};

#[tokio::test]
async fn rotation_preserves_every_value() {
    let (backend, store) = memory_store();
    let tenant = TenantId::new("t1");
    for i in 0..20 {
        store.set_secret(&tenant, &format!("k{i:02}"), &format!("value-{i}")).await.unwrap();
    }
    let wrapped_before = backend.get_wrapped_dek(&tenant).await.unwrap();

    let report = store.rotate_tenant_dek(&tenant).await.unwrap();
    assert_eq!(report.rotated, 20);
    assert_ne!(backend.get_wrapped_dek(&tenant).await.unwrap(), wrapped_before);

    for i in 0..20 {
        assert_eq!(
            store.get_secret(&tenant, &format!("k{i:02}")).await.unwrap(),
            Some(format!("value-{i}"))
        );
    }
}

#[tokio::test]
async fn rotated_values_survive_a_cold_cache() {
    let (backend, store) = memory_store();
    let tenant = TenantId::new("t1");
    store.set_secret(&tenant, "k", "v").await.unwrap();
    store.rotate_tenant_dek(&tenant).await.unwrap();

    // A fresh instance only sees what was durably committed.
    let cold = SecretStore::open(&config(), backend.clone()).unwrap();
    assert_eq!(cold.get_secret(&tenant, "k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn rotation_does_not_touch_other_tenants() {
    let (backend, store) = memory_store();
    let t1 = TenantId::new("t1");
    let t2 = TenantId::new("t2");
    store.set_secret(&t1, "k", "one").await.unwrap();
    store.set_secret(&t2, "k", "two").await.unwrap();
    let t2_wrapped = backend.get_wrapped_dek(&t2).await.unwrap();
    let t2_row = backend.get_secret(&t2, "k").await.unwrap();

    store.rotate_tenant_dek(&t1).await.unwrap();

    assert_eq!(backend.get_wrapped_dek(&t2).await.unwrap(), t2_wrapped);
    assert_eq!(backend.get_secret(&t2, "k").await.unwrap(), t2_row);
    assert_eq!(store.get_secret(&t2, "k").await.unwrap().as_deref(), Some("two"));
}

#[tokio::test]
async fn undecryptable_rows_are_reported_not_lost() {
    let (backend, store) = memory_store();
    let tenant = TenantId::new("t1");
    store.set_secret(&tenant, "good", "ok").await.unwrap();
    backend.put_secret(&tenant, "junk", "not-a-ciphertext", Utc::now()).await.unwrap();

    let report = store.rotate_tenant_dek(&tenant).await.unwrap();
    assert_eq!(report.rotated, 1);
    assert_eq!(report.failed, vec!["junk".to_string()]);

    let junk = backend.get_secret(&tenant, "junk").await.unwrap().unwrap();
    assert_eq!(junk.encrypted_value, "not-a-ciphertext");
    assert_eq!(store.get_secret(&tenant, "good").await.unwrap().as_deref(), Some("ok"));
}

#[tokio::test]
async fn failed_commit_leaves_old_dek_in_place() {
    let (backend, store) = memory_store();
    let tenant = TenantId::new("t1");
    store.set_secret(&tenant, "k", "v").await.unwrap();
    let before = store.keys().tenant_key(&tenant).await.unwrap();

    backend.set_fail_commits(true);
    let err = store.rotate_tenant_dek(&tenant).await.unwrap_err();
    assert!(!err.is_retryable());
    backend.set_fail_commits(false);

    let after = store.keys().tenant_key(&tenant).await.unwrap();
    assert!(before.same_key_as(&after));
    assert_eq!(store.get_secret(&tenant, "k").await.unwrap().as_deref(), Some("v"));

    let cold = SecretStore::open(&config(), backend.clone()).unwrap();
    assert_eq!(cold.get_secret(&tenant, "k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn writes_racing_rotation_stay_readable() {
    let (_, store) = memory_store();
    let store = Arc::new(store);
    let tenant = TenantId::new("t1");
    store.set_secret(&tenant, "seed", "0").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        let tenant = tenant.clone();
        handles.push(tokio::spawn(async move {
            if i % 4 == 0 {
                store.rotate_tenant_dek(&tenant).await.map(|_| ())
            } else {
                store.set_secret(&tenant, &format!("k{i}"), &format!("v{i}")).await
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for i in (0..16).filter(|i| i % 4 != 0) {
        assert_eq!(
            store.get_secret(&tenant, &format!("k{i}")).await.unwrap(),
            Some(format!("v{i}"))
        );
    }
    assert_eq!(store.get_secret(&tenant, "seed").await.unwrap().as_deref(), Some("0"));
}

// ============================================================================
// Reads overlapping a rotation
// ============================================================================

/// Memory backend whose row reads stall after fetching the row, leaving a
/// window for a rotation to start.
#[derive(Default)]
struct StallingReads {
    inner: MemoryBackend,
    stall: Duration,
}

#[async_trait]
impl SecretBackend for StallingReads {
    async fn get_wrapped_dek(&self, tenant_id: &TenantId) -> StorageResult<Option<String>> {
        self.inner.get_wrapped_dek(tenant_id).await
    }

    async fn insert_wrapped_dek_if_absent(
        &self,
        tenant_id: &TenantId,
        wrapped_dek: &str,
    ) -> StorageResult<bool> {
        self.inner.insert_wrapped_dek_if_absent(tenant_id, wrapped_dek).await
    }

    async fn get_secret(
        &self,
        tenant_id: &TenantId,
        key_name: &str,
    ) -> StorageResult<Option<EncryptedSecret>> {
        let row = self.inner.get_secret(tenant_id, key_name).await?;
        tokio::time::sleep(self.stall).await;
        Ok(row)
    }

    async fn secret_exists(&self, tenant_id: &TenantId, key_name: &str) -> StorageResult<bool> {
        self.inner.secret_exists(tenant_id, key_name).await
    }

    async fn put_secret(
        &self,
        tenant_id: &TenantId,
        key_name: &str,
        encrypted_value: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.inner.put_secret(tenant_id, key_name, encrypted_value, now).await
    }

    async fn delete_secret(&self, tenant_id: &TenantId, key_name: &str) -> StorageResult<bool> {
        self.inner.delete_secret(tenant_id, key_name).await
    }

    async fn list_secrets(&self, tenant_id: &TenantId) -> StorageResult<Vec<SecretMetadata>> {
        self.inner.list_secrets(tenant_id).await
    }

    async fn scan_secrets(&self, tenant_id: &TenantId) -> StorageResult<Vec<EncryptedSecret>> {
        self.inner.scan_secrets(tenant_id).await
    }

    async fn scan_all_secrets(&self) -> StorageResult<Vec<StoredSecretRef>> {
        self.inner.scan_all_secrets().await
    }

    async fn commit_batch(&self, ops: Vec<WriteOp>) -> StorageResult<Vec<usize>> {
        self.inner.commit_batch(ops).await
    }

    async fn missing_schema_objects(&self) -> StorageResult<Vec<String>> {
        self.inner.missing_schema_objects().await
    }
}

#[tokio::test]
async fn read_started_before_rotation_finishes_on_old_key() {
    let backend = Arc::new(StallingReads {
        stall: Duration::from_millis(100),
        ..Default::default()
    });
    let store = Arc::new(SecretStore::open(&config(), backend.clone()).unwrap());
    let tenant = TenantId::new("t1");
    store.set_secret(&tenant, "github_token", "ghp_abc123").await.unwrap();
    let wrapped_before = backend.get_wrapped_dek(&tenant).await.unwrap();

    let reader = {
        let store = store.clone();
        let tenant = tenant.clone();
        tokio::spawn(async move { store.get_secret(&tenant, "github_token").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let report = store.rotate_tenant_dek(&tenant).await.unwrap();
    assert_eq!(report.rotated, 1);

    assert_eq!(reader.await.unwrap().unwrap().as_deref(), Some("ghp_abc123"));
    assert_ne!(backend.get_wrapped_dek(&tenant).await.unwrap(), wrapped_before);
    assert_eq!(
        store.get_secret(&tenant, "github_token").await.unwrap().as_deref(),
        Some("ghp_abc123")
    );
}

#[tokio::test]
async fn finished_operations_leave_no_tenant_gates_behind() {
    let (_, store) = memory_store();
    for n in 0..100 {
        let tenant = TenantId::new(format!("t{n}"));
        store.set_secret(&tenant, "k", "v").await.unwrap();
        store.get_secret(&tenant, "k").await.unwrap();
    }
    store.rotate_tenant_dek(&TenantId::new("t0")).await.unwrap();
    store.delete_all_secrets(&TenantId::new("t1")).await.unwrap();
    assert_eq!(store.keys().gate_count(), 0);
}
