// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Stored root key shares and the recovery key.
//!
//! Both are persisted as seal-wrapped values in physical storage. The entries
//! themselves need no further barrier protection: only the seal backends can
//! unwrap them.
//!
//! ## Upgrades
//!
//! When a backend key rotates (or the seal generation changes) existing
//! entries are still readable but no longer current. [`KeyStore::upgrade_keys`]
//! re-wraps the recovery key, then the root key shares, skipping whatever is
//! already current.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

use super::access::SealAccess;
use super::wrapped::{
    seal_wrap_recovery_key, seal_wrap_stored_keys, unseal_wrap_recovery_key,
    unseal_wrap_stored_keys, SealWrappedValue,
};
use crate::error::{SealError, SealResult};
use crate::storage::paths::{RECOVERY_KEY_PATH, STORED_BARRIER_KEYS_PATH};
use crate::storage::{Entry, PhysicalBackend, StorageError};

/// Wraps, persists and upgrades key material through a [`SealAccess`].
pub struct KeyStore {
    access: Arc<dyn SealAccess>,
}

impl KeyStore {
    pub fn new(access: Arc<dyn SealAccess>) -> Self {
        Self { access }
    }

    // ========== Root Key Shares ==========

    pub async fn set_stored_keys(
        &self,
        physical: &dyn PhysicalBackend,
        keys: &[Vec<u8>],
    ) -> SealResult<()> {
        if keys.is_empty() {
            return Err(SealError::validation("keys were empty"));
        }

        let entry = seal_wrap_stored_keys(self.access.as_ref(), keys).await?;
        physical
            .put(entry)
            .await
            .map_err(|e| SealError::storage("failed to write keys to storage", e))
    }

    pub async fn stored_keys(&self, physical: &dyn PhysicalBackend) -> SealResult<Vec<Vec<u8>>> {
        let entry = physical
            .get(STORED_BARRIER_KEYS_PATH)
            .await
            .map_err(|e| SealError::storage("failed to fetch stored keys", e))?
            .ok_or_else(|| {
                SealError::storage(
                    "failed to fetch stored keys",
                    StorageError::NotFound(STORED_BARRIER_KEYS_PATH.to_string()),
                )
            })?;

        unseal_wrap_stored_keys(self.access.as_ref(), &entry).await
    }

    // ========== Recovery Key ==========

    pub async fn set_recovery_key(&self, physical: &dyn PhysicalBackend, key: &[u8]) -> SealResult<()> {
        if key.is_empty() {
            return Err(SealError::validation("recovery key to store is empty"));
        }

        let entry = seal_wrap_recovery_key(self.access.as_ref(), key).await?;
        physical.put(entry).await.map_err(|e| {
            error!(error = %e, "failed to write recovery key");
            SealError::storage("failed to write recovery key", e)
        })
    }

    pub async fn recovery_key(&self, physical: &dyn PhysicalBackend) -> SealResult<Vec<u8>> {
        let entry = physical.get(RECOVERY_KEY_PATH).await.map_err(|e| {
            error!(error = %e, "failed to read recovery key");
            SealError::storage("failed to read recovery key", e)
        })?;

        let Some(entry) = entry else {
            warn!("no recovery key found");
            return Err(SealError::not_found("no recovery key found"));
        };

        unseal_wrap_recovery_key(self.access.as_ref(), &entry).await
    }

    /// Compare `candidate` with the stored recovery key in constant time.
    pub async fn verify_recovery_key(
        &self,
        physical: &dyn PhysicalBackend,
        candidate: &[u8],
    ) -> SealResult<()> {
        if candidate.is_empty() {
            return Err(SealError::validation("recovery key to verify is empty"));
        }

        let stored = self.recovery_key(physical).await?;
        if recovery_key_matches(candidate, &stored) {
            Ok(())
        } else {
            Err(SealError::Mismatch(
                "recovery key does not match submitted values".to_string(),
            ))
        }
    }

    // ========== Upgrade ==========

    /// Re-wrap the recovery key and then the root key shares if either is
    /// not current. A recovery key failure stops before the root key.
    pub async fn upgrade_keys(&self, physical: &dyn PhysicalBackend) -> SealResult<()> {
        self.upgrade_recovery_key(physical).await?;
        self.upgrade_stored_keys(physical).await
    }

    async fn upgrade_recovery_key(&self, physical: &dyn PhysicalBackend) -> SealResult<()> {
        let Some(entry) = self.fetch_outdated(physical, RECOVERY_KEY_PATH, "recovery key").await?
        else {
            return Ok(());
        };

        info!("upgrading recovery key");
        let key = unseal_wrap_recovery_key(self.access.as_ref(), &entry).await?;
        self.set_recovery_key(physical, &key)
            .await
            .map_err(|e| e.context("failed to save upgraded recovery key"))
    }

    async fn upgrade_stored_keys(&self, physical: &dyn PhysicalBackend) -> SealResult<()> {
        let Some(entry) = self
            .fetch_outdated(physical, STORED_BARRIER_KEYS_PATH, "stored keys")
            .await?
        else {
            return Ok(());
        };

        info!("upgrading stored keys");
        let keys = unseal_wrap_stored_keys(self.access.as_ref(), &entry).await?;
        self.set_stored_keys(physical, &keys)
            .await
            .map_err(|e| e.context("failed to save upgraded stored keys"))
    }

    /// The entry at `path` if it needs re-wrapping, `None` when current.
    async fn fetch_outdated(
        &self,
        physical: &dyn PhysicalBackend,
        path: &str,
        what: &str,
    ) -> SealResult<Option<Entry>> {
        let entry = physical
            .get(path)
            .await
            .map_err(|e| SealError::storage(format!("failed to fetch {what}"), e))?
            .ok_or_else(|| SealError::not_found(format!("no {what} found")))?;

        let wrapped = SealWrappedValue::unmarshal(&entry.value)
            .map_err(|e| e.context(&format!("failed to unmarshal {what}")))?;
        let up_to_date = self
            .access
            .is_up_to_date(&wrapped, true)
            .await
            .map_err(|e| e.context(&format!("failed to check if {what} are up-to-date")))?;

        Ok((!up_to_date).then_some(entry))
    }
}

/// Constant-time equality; a length mismatch is not secret.
fn recovery_key_matches(candidate: &[u8], stored: &[u8]) -> bool {
    bool::from(candidate.ct_eq(stored))
}
