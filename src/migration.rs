//! One-shot move of secrets from the legacy global key to per-tenant DEKs.
//!
//! Every stored row is classified by one decision function; dry-run and
//! commit differ only in whether a `Migrate` decision is written back.

use serde::Serialize;
use tracing::{info, warn};
use vault_crypto::{decrypt, is_encrypted, SecretKey};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};
use crate::store::SecretStore;
use crate::types::{StoredSecretRef, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationMode {
    /// Classify every row, write nothing.
    DryRun,
    Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Already readable through the tenant's DEK.
    AlreadyMigrated,
    /// Not structurally an envelope (plaintext or foreign format).
    NotEncrypted,
    /// Row disappeared between the scan and the read.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RowOutcome {
    /// Re-stored under the tenant DEK (or would be, in a dry run).
    Migrated,
    Skipped { reason: SkipReason },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationEntry {
    pub tenant_id: TenantId,
    pub key_name: String,
    pub outcome: RowOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub mode: MigrationMode,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub entries: Vec<MigrationEntry>,
}

impl MigrationReport {
    fn new(mode: MigrationMode) -> Self {
        Self {
            mode,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            entries: Vec::new(),
        }
    }

    fn record(&mut self, row: StoredSecretRef, outcome: RowOutcome) {
        match &outcome {
            RowOutcome::Migrated => self.succeeded += 1,
            RowOutcome::Skipped { .. } => self.skipped += 1,
            RowOutcome::Failed { .. } => self.failed += 1,
        }
        self.entries.push(MigrationEntry {
            tenant_id: row.tenant_id,
            key_name: row.key_name,
            outcome,
        });
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Errors as `tenant/key: reason` lines.
    pub fn errors(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|entry| match &entry.outcome {
                RowOutcome::Failed { reason } => {
                    Some(format!("{}/{}: {reason}", entry.tenant_id, entry.key_name))
                }
                _ => None,
            })
            .collect()
    }
}

enum Decision {
    Skip(SkipReason),
    Fail(String),
    Migrate(Zeroizing<String>),
}

pub struct Migrator<'a> {
    store: &'a SecretStore,
    legacy_key: SecretKey,
}

impl<'a> Migrator<'a> {
    pub fn new(store: &'a SecretStore, legacy_key: SecretKey) -> Self {
        Self { store, legacy_key }
    }

    /// Parses the legacy key eagerly.
    pub fn from_hex(store: &'a SecretStore, legacy_key_hex: &str) -> Result<Self> {
        Ok(Self::new(store, SecretKey::from_hex(legacy_key_hex)?))
    }

    /// Fail fast when the envelope schema has not been applied yet.
    pub async fn preflight(&self) -> Result<()> {
        let missing = self.store.keys().backend().missing_schema_objects().await?;
        if missing.is_empty() {
            return Ok(());
        }
        Err(VaultError::SchemaNotReady {
            missing: missing.join(", "),
        })
    }

    pub async fn run(&self, mode: MigrationMode) -> Result<MigrationReport> {
        self.preflight().await?;

        let rows = self.store.keys().backend().scan_all_secrets().await?;
        info!(rows = rows.len(), ?mode, "starting legacy secret migration");

        let mut report = MigrationReport::new(mode);
        for row in rows {
            let outcome = match self.decide(&row).await {
                Decision::Skip(reason) => RowOutcome::Skipped { reason },
                Decision::Fail(reason) => {
                    warn!(tenant = %row.tenant_id, key = %row.key_name, %reason, "cannot migrate secret");
                    RowOutcome::Failed { reason }
                }
                Decision::Migrate(_) if mode == MigrationMode::DryRun => RowOutcome::Migrated,
                Decision::Migrate(plaintext) => {
                    match self
                        .store
                        .set_secret(&row.tenant_id, &row.key_name, &plaintext)
                        .await
                    {
                        Ok(()) => RowOutcome::Migrated,
                        Err(err) => {
                            warn!(tenant = %row.tenant_id, key = %row.key_name, error = %err,
                                "failed to store migrated secret");
                            RowOutcome::Failed {
                                reason: err.to_string(),
                            }
                        }
                    }
                }
            };
            report.record(row, outcome);
        }

        info!(
            ?mode,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "legacy secret migration finished"
        );
        Ok(report)
    }

    /// Reads only. Never creates a DEK, so a dry run writes nothing.
    async fn decide(&self, row: &StoredSecretRef) -> Decision {
        match self.store.get_secret(&row.tenant_id, &row.key_name).await {
            Ok(Some(_)) => return Decision::Skip(SkipReason::AlreadyMigrated),
            Ok(None) => return Decision::Skip(SkipReason::Deleted),
            Err(VaultError::Storage(err)) => return Decision::Fail(format!("storage error: {err}")),
            Err(_) => {}
        }
        if !is_encrypted(&row.encrypted_value) {
            return Decision::Skip(SkipReason::NotEncrypted);
        }
        match decrypt(&row.encrypted_value, &self.legacy_key) {
            Ok(plaintext) => Decision::Migrate(Zeroizing::new(plaintext)),
            Err(err) => Decision::Fail(format!("legacy decryption failed: {err}")),
        }
    }
}
