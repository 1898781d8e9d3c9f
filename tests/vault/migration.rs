use chrono::Utc;
use tenant_vault::{
    MigrationMode, Migrator, RowOutcome, SecretBackend, SkipReason, SqliteBackend, SecretStore,
    TenantId, VaultError,
};

use crate::common::{config, legacy_encrypt, legacy_key, memory_store, sqlite_store};

async fn seed_legacy(backend: &dyn SecretBackend) {
    let now = Utc::now();
    backend
        .put_secret(&"t1".into(), "github_token", &legacy_encrypt("ghp_abc123"), now)
        .await
        .unwrap();
    backend
        .put_secret(&"t1".into(), "webhook", &legacy_encrypt("whsec_1"), now)
        .await
        .unwrap();
    backend
        .put_secret(&"t2".into(), "plain_setting", "dark-mode", now)
        .await
        .unwrap();
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let (backend, store) = memory_store();
    seed_legacy(backend.as_ref()).await;
    let before = backend.scan_all_secrets().await.unwrap();

    let report = Migrator::new(&store, legacy_key())
        .run(MigrationMode::DryRun)
        .await
        .unwrap();
    assert_eq!(report.mode, MigrationMode::DryRun);
    assert_eq!((report.succeeded, report.failed, report.skipped), (2, 0, 1));

    assert_eq!(backend.scan_all_secrets().await.unwrap(), before);
    assert!(backend.get_wrapped_dek(&"t1".into()).await.unwrap().is_none());
    assert!(backend.get_wrapped_dek(&"t2".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn commit_migrates_and_second_run_skips_everything() {
    let (backend, store) = memory_store();
    seed_legacy(backend.as_ref()).await;
    let migrator = Migrator::new(&store, legacy_key());

    let first = migrator.run(MigrationMode::Commit).await.unwrap();
    assert_eq!((first.succeeded, first.failed, first.skipped), (2, 0, 1));
    assert_eq!(
        store.get_secret(&"t1".into(), "github_token").await.unwrap().as_deref(),
        Some("ghp_abc123")
    );

    let second = migrator.run(MigrationMode::Commit).await.unwrap();
    assert_eq!((second.succeeded, second.failed), (0, 0));
    assert_eq!(second.skipped, 3);
    let already: Vec<_> = second
        .entries
        .iter()
        .filter(|e| {
            e.outcome
                == RowOutcome::Skipped {
                    reason: SkipReason::AlreadyMigrated,
                }
        })
        .map(|e| e.key_name.as_str())
        .collect();
    assert_eq!(already, vec!["github_token", "webhook"]);
}

#[tokio::test]
async fn wrong_legacy_key_fails_rows_without_writing() {
    let (backend, store) = memory_store();
    seed_legacy(backend.as_ref()).await;
    let wrong = tenant_vault::crypto::SecretKey::generate().unwrap();

    let report = Migrator::new(&store, wrong)
        .run(MigrationMode::Commit)
        .await
        .unwrap();
    assert_eq!(report.failed, 2);
    assert!(report.has_failures());
    assert!(backend.get_wrapped_dek(&TenantId::new("t1")).await.unwrap().is_none());
}

#[tokio::test]
async fn preflight_rejects_missing_schema() {
    let backend = std::sync::Arc::new(SqliteBackend::open_in_memory().unwrap());
    let store = SecretStore::open(&config(), backend).unwrap();

    let err = Migrator::new(&store, legacy_key())
        .run(MigrationMode::DryRun)
        .await
        .unwrap_err();
    match err {
        VaultError::SchemaNotReady { missing } => {
            assert!(missing.contains("tenant_keys"));
            assert!(missing.contains("tenant_secrets"));
        }
        other => panic!("expected SchemaNotReady, got {other:?}"),
    }
}

#[tokio::test]
async fn migrates_sqlite_rows() {
    let (backend, store) = sqlite_store();
    seed_legacy(backend.as_ref()).await;

    let report = Migrator::new(&store, legacy_key())
        .run(MigrationMode::Commit)
        .await
        .unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(
        store.get_secret(&"t1".into(), "webhook").await.unwrap().as_deref(),
        Some("whsec_1")
    );
    assert_eq!(store.get_secret(&"t2".into(), "plain_setting").await.unwrap_err().to_string(),
        "Tenant not found: t2");
}
