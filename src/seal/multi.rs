// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Priority-ordered access over one or more seal backends.
//!
//! ## Strategy
//!
//! - **Encrypt** with every enabled backend. A backend that fails is logged
//!   and left out of the value; the call fails only when all of them fail.
//! - **Decrypt** by trying blobs in backend priority order, returning the
//!   first plaintext. Disabled backends still decrypt, which lets values
//!   written under a previous seal configuration be read during migration.
//! - **Up to date** means same generation and current key ids (see
//!   [`SealAccess::is_up_to_date`]).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::access::{SealAccess, SealBackendInfo, SealGenerationInfo, SealKmsConfig};
use super::wrapped::SealWrappedValue;
use crate::error::{SealError, SealResult};

/// [`SealAccess`] over a fixed set of backends.
#[derive(Debug)]
pub struct MultiSealAccess {
    generation: u64,
    backends: Vec<Arc<SealBackendInfo>>,
}

impl MultiSealAccess {
    /// Build access for seal `generation`. At least one backend is required
    /// and names must be unique.
    pub fn new(generation: u64, backends: Vec<SealBackendInfo>) -> SealResult<Self> {
        if backends.is_empty() {
            return Err(SealError::validation("at least one seal backend is required"));
        }
        let mut names = HashSet::new();
        for backend in &backends {
            if !names.insert(backend.name().to_string()) {
                return Err(SealError::validation(format!(
                    "duplicate seal backend name {:?}",
                    backend.name()
                )));
            }
        }
        if backends.iter().all(|b| b.is_disabled()) {
            return Err(SealError::validation("at least one seal backend must be enabled"));
        }

        let mut backends: Vec<Arc<SealBackendInfo>> = backends.into_iter().map(Arc::new).collect();
        backends.sort_by_key(|b| b.priority());
        Ok(Self {
            generation,
            backends,
        })
    }

    /// Single-backend access, generation 1.
    pub fn single(backend: SealBackendInfo) -> SealResult<Self> {
        Self::new(1, vec![backend])
    }

    fn enabled(&self) -> impl Iterator<Item = &Arc<SealBackendInfo>> {
        self.backends.iter().filter(|b| !b.is_disabled())
    }
}

#[async_trait]
impl SealAccess for MultiSealAccess {
    async fn init(&self) -> SealResult<()> {
        for backend in &self.backends {
            backend
                .wrapper()
                .init()
                .await
                .map_err(|e| e.context(&format!("failed to initialize seal {}", backend.name())))?;
        }
        Ok(())
    }

    async fn finalize(&self) -> SealResult<()> {
        for backend in &self.backends {
            backend
                .wrapper()
                .finalize()
                .await
                .map_err(|e| e.context(&format!("failed to finalize seal {}", backend.name())))?;
        }
        Ok(())
    }

    async fn encrypt(&self, plaintext: &[u8], aad: Option<&[u8]>) -> SealResult<SealWrappedValue> {
        let mut blobs = Vec::new();
        let mut errors = Vec::new();
        for backend in self.enabled() {
            match backend.encrypt(plaintext, aad).await {
                Ok(blob) => blobs.push(blob),
                Err(e) => {
                    warn!(seal_name = %backend.name(), error = %e, "seal backend failed to encrypt");
                    errors.push(format!("{}: {e}", backend.name()));
                }
            }
        }
        if blobs.is_empty() {
            return Err(SealError::crypto(format!(
                "no seal backend could encrypt the value: {}",
                errors.join("; ")
            )));
        }
        Ok(SealWrappedValue::new(self.generation, blobs))
    }

    async fn decrypt(&self, value: &SealWrappedValue, aad: Option<&[u8]>) -> SealResult<Vec<u8>> {
        let mut errors = Vec::new();
        for backend in &self.backends {
            let Some(blob) = value.blob(backend.name()) else {
                continue;
            };
            match backend.decrypt(blob, aad).await {
                Ok(plaintext) => return Ok(plaintext),
                Err(e) => {
                    warn!(seal_name = %backend.name(), error = %e, "seal backend failed to decrypt");
                    errors.push(format!("{}: {e}", backend.name()));
                }
            }
        }
        if errors.is_empty() {
            return Err(SealError::crypto(
                "value was not encrypted by any configured seal backend",
            ));
        }
        Err(SealError::crypto(format!(
            "no seal backend could decrypt the value: {}",
            errors.join("; ")
        )))
    }

    async fn is_up_to_date(
        &self,
        value: &SealWrappedValue,
        barrier_check: bool,
    ) -> SealResult<bool> {
        if value.generation != self.generation {
            return Ok(false);
        }
        let required: Vec<&Arc<SealBackendInfo>> = if barrier_check {
            self.enabled().collect()
        } else {
            self.enabled().take(1).collect()
        };
        for backend in required {
            let Some(blob) = value.blob(backend.name()) else {
                return Ok(false);
            };
            let current = backend
                .wrapper()
                .key_id()
                .await
                .map_err(|e| e.context(&format!("failed to read key id of seal {}", backend.name())))?;
            if blob.key_id != current {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn all_seal_info_by_priority(&self) -> Vec<Arc<SealBackendInfo>> {
        self.backends.clone()
    }

    fn seal_generation_info(&self) -> SealGenerationInfo {
        SealGenerationInfo {
            generation: self.generation,
            seals: self
                .backends
                .iter()
                .map(|b| SealKmsConfig {
                    name: b.name().to_string(),
                    seal_type: b.seal_type().to_string(),
                    priority: b.priority(),
                    disabled: b.is_disabled(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seal::aead::AeadWrapper;
    use crate::testing::FlakyWrapper;

    fn aead_backend(name: &str, priority: usize) -> (SealBackendInfo, Arc<AeadWrapper>) {
        let wrapper = Arc::new(AeadWrapper::generate().unwrap());
        (
            SealBackendInfo::new(name, priority, wrapper.clone() as Arc<dyn crate::seal::SealWrapper>),
            wrapper,
        )
    }

    #[test]
    fn rejects_empty_duplicate_and_all_disabled() {
        assert!(matches!(
            MultiSealAccess::new(1, vec![]),
            Err(SealError::Validation(_))
        ));

        let (a, _) = aead_backend("a", 1);
        let (a2, _) = aead_backend("a", 2);
        assert!(matches!(
            MultiSealAccess::new(1, vec![a, a2]),
            Err(SealError::Validation(_))
        ));

        let (d, _) = aead_backend("d", 1);
        assert!(matches!(
            MultiSealAccess::new(1, vec![d.with_disabled(true)]),
            Err(SealError::Validation(_))
        ));
    }

    #[test]
    fn backends_sorted_by_priority() {
        let (low, _) = aead_backend("low", 5);
        let (high, _) = aead_backend("high", 1);
        let access = MultiSealAccess::new(2, vec![low, high]).unwrap();

        let names: Vec<String> = access
            .all_seal_info_by_priority()
            .iter()
            .map(|b| b.name().to_string())
            .collect();
        assert_eq!(names, vec!["high", "low"]);

        let info = access.seal_generation_info();
        assert_eq!(info.generation, 2);
        assert_eq!(info.seals.len(), 2);
        assert_eq!(info.seals[0].seal_type, "aead");
    }

    #[tokio::test]
    async fn encrypt_writes_one_blob_per_enabled_backend() {
        let (a, _) = aead_backend("a", 1);
        let (b, _) = aead_backend("b", 2);
        let (old, _) = aead_backend("old", 3);
        let access = MultiSealAccess::new(1, vec![a, b, old.with_disabled(true)]).unwrap();

        let value = access.encrypt(b"secret", None).await.unwrap();
        assert_eq!(value.blobs.len(), 2);
        assert!(value.blob("a").is_some());
        assert!(value.blob("b").is_some());
        assert!(value.blob("old").is_none());
        assert_eq!(access.decrypt(&value, None).await.unwrap(), b"secret");
    }

    #[tokio::test]
    async fn encrypt_tolerates_partial_failure() {
        let flaky = Arc::new(FlakyWrapper::new("flaky"));
        flaky.set_fail_encrypt(true);
        let (good, _) = aead_backend("good", 2);
        let access = MultiSealAccess::new(
            1,
            vec![SealBackendInfo::new("flaky", 1, flaky.clone()), good],
        )
        .unwrap();

        let value = access.encrypt(b"x", None).await.unwrap();
        assert_eq!(value.blobs.len(), 1);
        assert_eq!(value.blobs[0].seal_name, "good");

        let only_flaky = MultiSealAccess::single(SealBackendInfo::new("flaky", 1, flaky)).unwrap();
        assert!(matches!(
            only_flaky.encrypt(b"x", None).await,
            Err(SealError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn decrypt_falls_back_to_next_backend() {
        let flaky = Arc::new(FlakyWrapper::new("flaky"));
        let (good, _) = aead_backend("good", 2);
        let access = MultiSealAccess::new(
            1,
            vec![SealBackendInfo::new("flaky", 1, flaky.clone()), good],
        )
        .unwrap();

        let value = access.encrypt(b"payload", None).await.unwrap();
        flaky.set_fail_decrypt(true);
        assert_eq!(access.decrypt(&value, None).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn decrypt_rejects_foreign_value() {
        let (a, _) = aead_backend("a", 1);
        let (other, _) = aead_backend("other", 1);
        let access = MultiSealAccess::single(a).unwrap();
        let foreign = MultiSealAccess::single(other).unwrap();

        let value = foreign.encrypt(b"x", None).await.unwrap();
        assert!(matches!(
            access.decrypt(&value, None).await,
            Err(SealError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn up_to_date_tracks_key_rotation_and_generation() {
        let (a, a_key) = aead_backend("a", 1);
        let (b, b_key) = aead_backend("b", 2);
        let access = MultiSealAccess::new(1, vec![a, b]).unwrap();
        let value = access.encrypt(b"v", None).await.unwrap();

        assert!(access.is_up_to_date(&value, true).await.unwrap());

        // rotating the secondary only matters for barrier checks
        b_key.rotate_key().unwrap();
        assert!(!access.is_up_to_date(&value, true).await.unwrap());
        assert!(access.is_up_to_date(&value, false).await.unwrap());

        a_key.rotate_key().unwrap();
        assert!(!access.is_up_to_date(&value, false).await.unwrap());

        let mut old_generation = access.encrypt(b"v", None).await.unwrap();
        assert!(access.is_up_to_date(&old_generation, true).await.unwrap());
        old_generation.generation = 0;
        assert!(!access.is_up_to_date(&old_generation, true).await.unwrap());
    }
}
