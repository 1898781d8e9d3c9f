//! SqliteBackend: a SecretBackend over a single rusqlite connection.
//!
//! The connection sits behind a mutex and every call runs on the blocking
//! pool via `tokio::task::spawn_blocking`, so async callers never stall the
//! runtime on disk I/O.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StorageError, StorageResult};
use crate::types::{EncryptedSecret, SecretMetadata, StoredSecretRef, TenantId};

use super::traits::{SecretBackend, WriteOp};

const CREATE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tenant_keys (
    tenant_id     TEXT PRIMARY KEY,
    encrypted_dek TEXT
);
CREATE TABLE IF NOT EXISTS tenant_secrets (
    tenant_id       TEXT NOT NULL,
    key_name        TEXT NOT NULL,
    encrypted_value TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (tenant_id, key_name)
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Tables and the columns each must carry.
const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    ("tenant_keys", &["tenant_id", "encrypted_dek"]),
    (
        "tenant_secrets",
        &["tenant_id", "key_name", "encrypted_value", "created_at", "updated_at"],
    ),
];

pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        // Other processes may hold the write lock briefly.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create the tables if they do not exist yet.
    pub fn initialize(&self) -> StorageResult<()> {
        self.conn.lock().execute_batch(CREATE_SCHEMA)?;
        Ok(())
    }

    async fn run<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn apply_op(tx: &rusqlite::Transaction<'_>, op: &WriteOp) -> StorageResult<usize> {
    match op {
        WriteOp::ReplaceSecret {
            tenant_id,
            key_name,
            expected,
            encrypted_value,
            updated_at,
        } => {
            let changed = tx.execute(
                "UPDATE tenant_secrets SET encrypted_value = ?1, updated_at = ?2
                 WHERE tenant_id = ?3 AND key_name = ?4 AND encrypted_value = ?5",
                params![encrypted_value, updated_at, tenant_id.as_str(), key_name, expected],
            )?;
            if changed == 0 {
                return Err(StorageError::Conflict(format!(
                    "secret {tenant_id}/{key_name} changed during the batch"
                )));
            }
            Ok(changed)
        }
        WriteOp::ReplaceWrappedDek {
            tenant_id,
            expected,
            wrapped_dek,
        } => {
            let changed = tx.execute(
                "UPDATE tenant_keys SET encrypted_dek = ?1
                 WHERE tenant_id = ?2 AND encrypted_dek = ?3",
                params![wrapped_dek, tenant_id.as_str(), expected],
            )?;
            if changed == 0 {
                return Err(StorageError::Conflict(format!(
                    "wrapped DEK of tenant {tenant_id} changed during the batch"
                )));
            }
            Ok(changed)
        }
        WriteOp::DeleteTenantSecrets { tenant_id } => Ok(tx.execute(
            "DELETE FROM tenant_secrets WHERE tenant_id = ?1",
            params![tenant_id.as_str()],
        )?),
        WriteOp::ClearWrappedDek { tenant_id } => Ok(tx.execute(
            "UPDATE tenant_keys SET encrypted_dek = NULL WHERE tenant_id = ?1",
            params![tenant_id.as_str()],
        )?),
    }
}

fn table_columns(conn: &Connection, table: &str) -> StorageResult<Option<Vec<String>>> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(columns))
}

#[async_trait]
impl SecretBackend for SqliteBackend {
    async fn get_wrapped_dek(&self, tenant_id: &TenantId) -> StorageResult<Option<String>> {
        let tenant = tenant_id.as_str().to_string();
        self.run(move |conn| {
            let dek: Option<Option<String>> = conn
                .query_row(
                    "SELECT encrypted_dek FROM tenant_keys WHERE tenant_id = ?1",
                    params![tenant],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(dek.flatten())
        })
        .await
    }

    async fn insert_wrapped_dek_if_absent(
        &self,
        tenant_id: &TenantId,
        wrapped_dek: &str,
    ) -> StorageResult<bool> {
        let tenant = tenant_id.as_str().to_string();
        let wrapped = wrapped_dek.to_string();
        self.run(move |conn| {
            // A row with a NULL key (cleared by delete-all) counts as absent.
            let changed = conn.execute(
                "INSERT INTO tenant_keys (tenant_id, encrypted_dek) VALUES (?1, ?2)
                 ON CONFLICT(tenant_id) DO UPDATE SET encrypted_dek = excluded.encrypted_dek
                 WHERE tenant_keys.encrypted_dek IS NULL",
                params![tenant, wrapped],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn get_secret(
        &self,
        tenant_id: &TenantId,
        key_name: &str,
    ) -> StorageResult<Option<EncryptedSecret>> {
        let tenant = tenant_id.as_str().to_string();
        let key = key_name.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT key_name, encrypted_value, created_at, updated_at
                     FROM tenant_secrets WHERE tenant_id = ?1 AND key_name = ?2",
                    params![tenant, key],
                    |row| {
                        Ok(EncryptedSecret {
                            key_name: row.get(0)?,
                            encrypted_value: row.get(1)?,
                            created_at: row.get(2)?,
                            updated_at: row.get(3)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }

    async fn secret_exists(&self, tenant_id: &TenantId, key_name: &str) -> StorageResult<bool> {
        let tenant = tenant_id.as_str().to_string();
        let key = key_name.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM tenant_secrets WHERE tenant_id = ?1 AND key_name = ?2",
                    params![tenant, key],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
        .await
    }

    async fn put_secret(
        &self,
        tenant_id: &TenantId,
        key_name: &str,
        encrypted_value: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let tenant = tenant_id.as_str().to_string();
        let key = key_name.to_string();
        let value = encrypted_value.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO tenant_secrets
                     (tenant_id, key_name, encrypted_value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(tenant_id, key_name) DO UPDATE SET
                     encrypted_value = excluded.encrypted_value,
                     updated_at = excluded.updated_at",
                params![tenant, key, value, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_secret(&self, tenant_id: &TenantId, key_name: &str) -> StorageResult<bool> {
        let tenant = tenant_id.as_str().to_string();
        let key = key_name.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "DELETE FROM tenant_secrets WHERE tenant_id = ?1 AND key_name = ?2",
                params![tenant, key],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list_secrets(&self, tenant_id: &TenantId) -> StorageResult<Vec<SecretMetadata>> {
        let tenant = tenant_id.as_str().to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key_name, created_at, updated_at FROM tenant_secrets
                 WHERE tenant_id = ?1 ORDER BY key_name",
            )?;
            let rows = stmt
                .query_map(params![tenant], |row| {
                    Ok(SecretMetadata {
                        key_name: row.get(0)?,
                        created_at: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn scan_secrets(&self, tenant_id: &TenantId) -> StorageResult<Vec<EncryptedSecret>> {
        let tenant = tenant_id.as_str().to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key_name, encrypted_value, created_at, updated_at FROM tenant_secrets
                 WHERE tenant_id = ?1 ORDER BY key_name",
            )?;
            let rows = stmt
                .query_map(params![tenant], |row| {
                    Ok(EncryptedSecret {
                        key_name: row.get(0)?,
                        encrypted_value: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn scan_all_secrets(&self) -> StorageResult<Vec<StoredSecretRef>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT tenant_id, key_name, encrypted_value FROM tenant_secrets
                 ORDER BY tenant_id, key_name",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(StoredSecretRef {
                        tenant_id: TenantId::new(row.get::<_, String>(0)?),
                        key_name: row.get(1)?,
                        encrypted_value: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn commit_batch(&self, ops: Vec<WriteOp>) -> StorageResult<Vec<usize>> {
        self.run(move |conn| {
            // Dropping the transaction on an early return rolls it back.
            let tx = conn.transaction()?;
            let mut affected = Vec::with_capacity(ops.len());
            for op in &ops {
                affected.push(apply_op(&tx, op)?);
            }
            tx.commit().map_err(|e| StorageError::Transaction {
                message: "commit failed".to_string(),
                source: Some(Box::new(e)),
            })?;
            Ok(affected)
        })
        .await
    }

    async fn missing_schema_objects(&self) -> StorageResult<Vec<String>> {
        self.run(|conn| {
            let mut missing = Vec::new();
            for (table, columns) in REQUIRED_SCHEMA {
                match table_columns(conn, table)? {
                    None => missing.push(format!("table {table}")),
                    Some(present) => {
                        for column in *columns {
                            if !present.iter().any(|c| c == column) {
                                missing.push(format!("column {table}.{column}"));
                            }
                        }
                    }
                }
            }
            Ok(missing)
        })
        .await
    }
}

// ============================================================================
// Tests
// ============================================================================
