//! Key vault contract.
//!
//! The vault owns [`EncryptionKey`] lifecycle: key material produced by
//! an encrypt job is stored wrapped (never plaintext at rest), scoped to
//! the owner inherited from the job, and becomes unreadable once expired
//! or revoked even while the record physically remains.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::{JobId, KeyId, OwnerId, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("key not found")]
    NotFound,

    /// The record exists but its `expires_at` has passed or it was revoked.
    #[error("key expired")]
    Expired,

    /// The record has an owner and the requesting owner does not match.
    #[error("forbidden: requesting owner does not match key owner")]
    Forbidden,

    /// A lifecycle rule was violated, e.g. a second key stored for one job.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("vault unavailable: {0}")]
    Unavailable(String),
}

/// Durable, job-scoped store of derived key material.
///
/// `retrieve` enforces ownership before expiry, but both conditions are
/// independent: an expired key is `Expired` for its owner, and a foreign
/// key is `Forbidden` whether or not it has expired.
#[async_trait]
pub trait KeyVault: Send + Sync {
    /// Wrap and persist key material for `job_id`. The owner is inherited
    /// from the job; `ttl`, when present, sets `expires_at` relative to now.
    async fn store(
        &self,
        job_id: JobId,
        owner_id: Option<OwnerId>,
        material: &[u8],
        ttl: Option<Duration>,
    ) -> Result<KeyId, VaultError>;

    /// Unwrap and return the key material, enforcing owner and expiry.
    async fn retrieve(
        &self,
        key_id: KeyId,
        requesting_owner: Option<OwnerId>,
    ) -> Result<Vec<u8>, VaultError>;

    /// Soft-delete the record. Subsequent retrieves return `Expired`.
    async fn revoke(&self, key_id: KeyId) -> Result<(), VaultError>;

    /// Whether a record with this id exists at all, live or not. Used by
    /// the submission path to confirm a decrypt key reference resolves;
    /// owner and expiry are enforced later, at retrieve time.
    async fn exists(&self, key_id: KeyId) -> Result<bool, VaultError>;
}

/// Decide whether `requesting_owner` may read a record owned by
/// `record_owner`, and whether the record is still live at `now`.
///
/// Shared by the vault implementations so the access rules cannot drift:
/// owner mismatch wins over expiry, and an ownerless record is readable
/// by anyone.
pub fn check_access(
    record_owner: Option<OwnerId>,
    requesting_owner: Option<OwnerId>,
    expires_at: Option<Timestamp>,
    revoked_at: Option<Timestamp>,
    now: Timestamp,
) -> Result<(), VaultError> {
    if let Some(owner) = record_owner {
        if requesting_owner != Some(owner) {
            return Err(VaultError::Forbidden);
        }
    }
    if revoked_at.is_some() {
        return Err(VaultError::Expired);
    }
    if let Some(expiry) = expires_at {
        if expiry <= now {
            return Err(VaultError::Expired);
        }
    }
    Ok(())
}
