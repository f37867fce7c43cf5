// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Seal backend access.
//!
//! A [`SealWrapper`] is one external key-management backend: an opaque
//! encrypt/decrypt capability plus its current key id. A [`SealBackendInfo`]
//! attaches a name, a priority and health state to a wrapper. A
//! [`SealAccess`] combines every configured backend behind the interface the
//! auto-unseal manager uses.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use super::wrapped::{BlobInfo, SealWrappedValue};
use crate::error::SealResult;

/// A single seal backend.
#[async_trait]
pub trait SealWrapper: Send + Sync {
    /// Declared backend type, e.g. `awskms` or `aead`.
    fn seal_type(&self) -> &str;

    /// Identifier of the key new encryptions use.
    async fn key_id(&self) -> SealResult<String>;

    async fn init(&self) -> SealResult<()> {
        Ok(())
    }

    async fn finalize(&self) -> SealResult<()> {
        Ok(())
    }

    async fn encrypt(&self, plaintext: &[u8], aad: Option<&[u8]>) -> SealResult<BlobInfo>;

    async fn decrypt(&self, blob: &BlobInfo, aad: Option<&[u8]>) -> SealResult<Vec<u8>>;
}

/// Health of one backend as last observed by the health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendHealth {
    pub healthy: bool,
    pub last_seen_healthy: DateTime<Utc>,
    pub last_health_check: Option<DateTime<Utc>>,
}

/// A configured backend with its health state.
///
/// The health mutex is held for the whole duration of a check, so checks of
/// the same backend never overlap and readers see complete results.
pub struct SealBackendInfo {
    name: String,
    priority: usize,
    disabled: bool,
    wrapper: Arc<dyn SealWrapper>,
    health: Mutex<BackendHealth>,
}

impl SealBackendInfo {
    /// Create an enabled, healthy backend. Lower priority values win.
    pub fn new(name: impl Into<String>, priority: usize, wrapper: Arc<dyn SealWrapper>) -> Self {
        Self {
            name: name.into(),
            priority,
            disabled: false,
            wrapper,
            health: Mutex::new(BackendHealth {
                healthy: true,
                last_seen_healthy: Utc::now(),
                last_health_check: None,
            }),
        }
    }

    /// Mark the backend as decrypt-only (the old side of a seal migration).
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> usize {
        self.priority
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn seal_type(&self) -> &str {
        self.wrapper.seal_type()
    }

    pub fn wrapper(&self) -> &Arc<dyn SealWrapper> {
        &self.wrapper
    }

    /// Encrypt with this backend and tag the blob with its name.
    pub async fn encrypt(&self, plaintext: &[u8], aad: Option<&[u8]>) -> SealResult<BlobInfo> {
        let mut blob = self.wrapper.encrypt(plaintext, aad).await?;
        blob.seal_name = self.name.clone();
        Ok(blob)
    }

    pub async fn decrypt(&self, blob: &BlobInfo, aad: Option<&[u8]>) -> SealResult<Vec<u8>> {
        self.wrapper.decrypt(blob, aad).await
    }

    /// Exclusive access to the health state. Waits for an in-flight check.
    pub async fn lock_health(&self) -> MutexGuard<'_, BackendHealth> {
        self.health.lock().await
    }

    /// Snapshot of the health state.
    pub async fn health(&self) -> BackendHealth {
        self.health.lock().await.clone()
    }
}

impl std::fmt::Debug for SealBackendInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealBackendInfo")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("disabled", &self.disabled)
            .field("seal_type", &self.wrapper.seal_type())
            .finish()
    }
}

/// Static description of one configured backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SealKmsConfig {
    pub name: String,
    pub seal_type: String,
    pub priority: usize,
    pub disabled: bool,
}

/// The configured seal generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SealGenerationInfo {
    pub generation: u64,
    pub seals: Vec<SealKmsConfig>,
}

/// Every configured seal backend behind one encrypt/decrypt interface.
#[async_trait]
pub trait SealAccess: Send + Sync {
    async fn init(&self) -> SealResult<()>;

    async fn finalize(&self) -> SealResult<()>;

    async fn encrypt(&self, plaintext: &[u8], aad: Option<&[u8]>) -> SealResult<SealWrappedValue>;

    async fn decrypt(&self, value: &SealWrappedValue, aad: Option<&[u8]>) -> SealResult<Vec<u8>>;

    /// Whether `value` was produced by the current generation and current
    /// backend keys. `barrier_check` requires every enabled backend to be
    /// current, not only the primary one.
    async fn is_up_to_date(&self, value: &SealWrappedValue, barrier_check: bool)
        -> SealResult<bool>;

    /// Backends ordered by priority, highest first.
    fn all_seal_info_by_priority(&self) -> Vec<Arc<SealBackendInfo>>;

    fn seal_generation_info(&self) -> SealGenerationInfo;
}
