use std::sync::Arc;

use tenant_vault::{SecretBackend, SecretStore, SqliteBackend, TenantId};

use crate::common::{config, sqlite_store};

#[tokio::test]
async fn full_lifecycle_on_sqlite() {
    let (backend, store) = sqlite_store();
    let tenant = TenantId::new("t1");

    store.set_secret(&tenant, "github_token", "ghp_abc123").await.unwrap();
    store.set_secret(&tenant, "stripe_key", "sk_test_1").await.unwrap();
    assert_eq!(store.list_secrets(&tenant).await.unwrap().len(), 2);

    let report = store.rotate_tenant_dek(&tenant).await.unwrap();
    assert_eq!(report.rotated, 2);
    assert_eq!(
        store.get_secret(&tenant, "stripe_key").await.unwrap().as_deref(),
        Some("sk_test_1")
    );

    assert_eq!(store.delete_all_secrets(&tenant).await.unwrap(), 2);
    assert!(backend.get_wrapped_dek(&tenant).await.unwrap().is_none());
}

#[tokio::test]
async fn secrets_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");
    let tenant = TenantId::new("t1");

    {
        let backend = SqliteBackend::open(&path).unwrap();
        backend.initialize().unwrap();
        let store = SecretStore::open(&config(), Arc::new(backend)).unwrap();
        store.set_secret(&tenant, "k", "persisted").await.unwrap();
        store.rotate_tenant_dek(&tenant).await.unwrap();
    }

    let backend = SqliteBackend::open(&path).unwrap();
    let store = SecretStore::open(&config(), Arc::new(backend)).unwrap();
    assert_eq!(store.get_secret(&tenant, "k").await.unwrap().as_deref(), Some("persisted"));
    assert!(store.inspect_tenant_key(&tenant).await.unwrap().can_decrypt);
}

#[tokio::test]
async fn concurrent_first_writes_share_one_dek_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    SqliteBackend::open(&path).unwrap().initialize().unwrap();
    let tenant = TenantId::new("racy");

    let mut handles = Vec::new();
    for i in 0..6 {
        let path = path.clone();
        let tenant = tenant.clone();
        handles.push(tokio::spawn(async move {
            // Separate connections, separate caches: one per simulated process.
            let backend = SqliteBackend::open(&path).unwrap();
            let store = SecretStore::open(&config(), Arc::new(backend)).unwrap();
            store.set_secret(&tenant, &format!("k{i}"), "v").await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let store = SecretStore::open(&config(), Arc::new(SqliteBackend::open(&path).unwrap())).unwrap();
    for i in 0..6 {
        assert_eq!(
            store.get_secret(&tenant, &format!("k{i}")).await.unwrap().as_deref(),
            Some("v")
        );
    }
}
