//! Per-tenant DEK rotation.
//!
//! Every secret is decrypted with the old DEK and re-encrypted with a fresh
//! one. The rewritten rows and the new wrapped DEK go to storage in a single
//! batch; the cached DEK is only swapped after that batch commits.

use chrono::Utc;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::Result;
use crate::keys::{KeyHierarchy, TenantDek};
use crate::storage::WriteOp;
use crate::types::{RotationReport, TenantId};

/// Rotate a tenant's DEK.
///
/// Secrets that do not decrypt under the current DEK are left as they are
/// and named in [`RotationReport::failed`]. Any storage error aborts the
/// rotation with durable state and the cache still on the old DEK.
pub async fn rotate_tenant_dek(keys: &KeyHierarchy, tenant: &TenantId) -> Result<RotationReport> {
    let guard = keys.rotation_gate(tenant).await;
    let (old_dek, old_wrapped) = keys.load_for_rotation(&guard).await?;

    let new_dek = TenantDek::generate(tenant)?;
    let new_wrapped = keys.wrap(&new_dek)?;

    let secrets = keys.backend().scan_secrets(tenant).await?;
    let now = Utc::now();

    let mut report = RotationReport::default();
    let mut ops = Vec::with_capacity(secrets.len() + 1);
    for secret in secrets {
        let plaintext = match old_dek.decrypt(&secret.encrypted_value) {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(err) => {
                warn!(tenant = %tenant, key = %secret.key_name, error = %err,
                    "secret does not decrypt under the current DEK, leaving it in place");
                report.failed.push(secret.key_name);
                continue;
            }
        };
        let encrypted_value = new_dek.encrypt(&plaintext)?;
        ops.push(WriteOp::ReplaceSecret {
            tenant_id: tenant.clone(),
            key_name: secret.key_name,
            expected: secret.encrypted_value,
            encrypted_value,
            updated_at: now,
        });
        report.rotated += 1;
    }
    ops.push(WriteOp::ReplaceWrappedDek {
        tenant_id: tenant.clone(),
        expected: old_wrapped,
        wrapped_dek: new_wrapped,
    });

    keys.backend().commit_batch(ops).await?;
    keys.install(&guard, &new_dek);

    info!(
        tenant = %tenant,
        rotated = report.rotated,
        failed = report.failed.len(),
        "rotated tenant DEK"
    );
    Ok(report)
}
