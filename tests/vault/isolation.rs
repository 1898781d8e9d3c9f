use std::sync::Arc;

use chrono::Utc;
use tenant_vault::{SecretBackend, SecretStore, TenantId, VaultConfig};

use crate::common::{memory_store, OTHER_KEK};

#[tokio::test]
async fn tenants_use_distinct_deks() {
    let (_, store) = memory_store();
    let a = TenantId::new("tenant-a");
    let b = TenantId::new("tenant-b");
    store.set_secret(&a, "k", "value-a").await.unwrap();
    store.set_secret(&b, "k", "value-b").await.unwrap();

    let dek_a = store.keys().tenant_key(&a).await.unwrap();
    let dek_b = store.keys().tenant_key(&b).await.unwrap();
    assert!(!dek_a.same_key_as(&dek_b));
}

#[tokio::test]
async fn copied_ciphertext_does_not_decrypt_for_another_tenant() {
    let (backend, store) = memory_store();
    let a = TenantId::new("tenant-a");
    let b = TenantId::new("tenant-b");
    store.set_secret(&a, "k", "only-for-a").await.unwrap();
    store.set_secret(&b, "other", "b").await.unwrap();

    // Copy tenant A's row verbatim under tenant B.
    let row = backend.get_secret(&a, "k").await.unwrap().unwrap();
    backend.put_secret(&b, "k", &row.encrypted_value, Utc::now()).await.unwrap();

    let err = store.get_secret(&b, "k").await.unwrap_err();
    assert!(err.is_decryption());
    assert_eq!(store.safe_get_secret(&b, "k").await, None);
}

#[tokio::test]
async fn wrong_kek_cannot_read() {
    let (backend, store) = memory_store();
    let tenant = TenantId::new("t1");
    store.set_secret(&tenant, "k", "v").await.unwrap();

    let config = VaultConfig::default().with_kek(OTHER_KEK);
    let intruder = SecretStore::open(&config, backend.clone()).unwrap();
    let err = intruder.get_secret(&tenant, "k").await.unwrap_err();
    assert!(err.is_decryption());

    let status = intruder.inspect_tenant_key(&tenant).await.unwrap();
    assert!(status.exists);
    assert!(!status.can_decrypt);
}

#[tokio::test]
async fn concurrent_first_writes_share_one_dek() {
    let (backend, _) = memory_store();
    let tenant = TenantId::new("busy");

    let mut handles = Vec::new();
    for i in 0..10 {
        let backend = backend.clone();
        let tenant = tenant.clone();
        handles.push(tokio::spawn(async move {
            // Each task stands in for a separate process with its own cache.
            let store = SecretStore::open(&crate::common::config(), backend).unwrap();
            store.set_secret(&tenant, &format!("k{i}"), &format!("v{i}")).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let store = SecretStore::open(&crate::common::config(), backend as Arc<dyn SecretBackend>).unwrap();
    for i in 0..10 {
        assert_eq!(
            store.get_secret(&tenant, &format!("k{i}")).await.unwrap(),
            Some(format!("v{i}"))
        );
    }
}
