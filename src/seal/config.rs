// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Seal configuration records and their store.
//!
//! Two configs exist: the barrier config (how the root key is protected) and
//! the recovery config (how the recovery key is split). Both are persisted as
//! plaintext JSON in physical storage and cached in memory. The cache hands
//! out clones only; writers replace the whole value.
//!
//! The recovery config used to live inside the barrier. Every recovery config
//! write first moves a legacy entry, if present, to the plaintext location.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::core::SealCore;
use crate::error::{SealError, SealResult};
use crate::storage::paths::{
    BARRIER_SEAL_CONFIG_PATH, RECOVERY_SEAL_CONFIG_PATH, RECOVERY_SEAL_CONFIG_PLAINTEXT_PATH,
};
use crate::storage::{Entry, PhysicalBackend};

/// Kind of seal a config belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SealConfigType {
    /// More than one seal backend configured.
    Multiseal,
    /// The recovery config of an auto seal.
    Recovery,
    /// A single backend of the given declared type.
    Backend(String),
}

impl SealConfigType {
    pub const MULTISEAL: &'static str = "multiseal";
    pub const RECOVERY: &'static str = "recovery";

    pub fn as_str(&self) -> &str {
        match self {
            Self::Multiseal => Self::MULTISEAL,
            Self::Recovery => Self::RECOVERY,
            Self::Backend(t) => t,
        }
    }

    /// Loose comparison: ignores case and any non-alphanumeric characters,
    /// so `Recovery`, `recovery` and ` re-covery` all match.
    pub fn is_same_as(&self, other: &str) -> bool {
        normalize(self.as_str()) == normalize(other)
    }
}

impl fmt::Display for SealConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Persisted seal configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SealConfig {
    /// Seal type, stamped by the store on every write.
    #[serde(rename = "type", default)]
    pub seal_type: String,
    #[serde(default)]
    pub secret_shares: u32,
    #[serde(default)]
    pub secret_threshold: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pgp_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nonce: String,
    #[serde(default)]
    pub backup: bool,
    #[serde(default)]
    pub stored_shares: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Backend-specific fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SealConfig {
    pub fn new(secret_shares: u32, secret_threshold: u32) -> Self {
        Self {
            secret_shares,
            secret_threshold,
            ..Self::default()
        }
    }

    fn to_entry(&self, path: &str) -> SealResult<Entry> {
        let value = serde_json::to_vec(self)
            .map_err(|e| SealError::config(format!("failed to encode seal configuration: {e}")))?;
        Ok(Entry::new(path, value))
    }

    fn from_entry(entry: &Entry) -> SealResult<Self> {
        serde_json::from_slice(&entry.value)
            .map_err(|e| SealError::config(format!("failed to decode seal configuration: {e}")))
    }
}

/// Hook run on every barrier config load, before the type comparison.
pub type BarrierTypeUpgradeCheck = Arc<dyn Fn(&SealConfigType, &mut SealConfig) + Send + Sync>;

/// Default hook: leaves the config untouched.
pub fn no_barrier_type_upgrade() -> BarrierTypeUpgradeCheck {
    Arc::new(|_, _| {})
}

/// Cached config. Readers get a clone; writers swap the whole value.
#[derive(Default)]
struct ConfigCell(RwLock<Option<Arc<SealConfig>>>);

impl ConfigCell {
    fn load(&self) -> Option<SealConfig> {
        let guard = self.0.read().unwrap_or_else(|p| p.into_inner());
        guard.as_deref().cloned()
    }

    fn store(&self, config: Option<SealConfig>) {
        let mut guard = self.0.write().unwrap_or_else(|p| p.into_inner());
        *guard = config.map(Arc::new);
    }
}

/// Reads and writes the barrier and recovery seal configs.
pub struct ConfigStore {
    barrier_type: SealConfigType,
    barrier_config: ConfigCell,
    recovery_config: ConfigCell,
    upgrade_check: BarrierTypeUpgradeCheck,
}

impl ConfigStore {
    pub fn new(barrier_type: SealConfigType) -> Self {
        Self {
            barrier_type,
            barrier_config: ConfigCell::default(),
            recovery_config: ConfigCell::default(),
            upgrade_check: no_barrier_type_upgrade(),
        }
    }

    pub fn set_upgrade_check(&mut self, check: BarrierTypeUpgradeCheck) {
        self.upgrade_check = check;
    }

    pub fn barrier_type(&self) -> &SealConfigType {
        &self.barrier_type
    }

    // ========== Barrier Config ==========

    /// Cached barrier config, else the stored one. `None` means not
    /// initialized.
    pub async fn barrier_config(&self, core: &dyn SealCore) -> SealResult<Option<SealConfig>> {
        if let Some(cfg) = self.barrier_config.load() {
            return Ok(Some(cfg));
        }

        let conf = match read_config(core.physical().as_ref(), BARRIER_SEAL_CONFIG_PATH).await {
            Ok(conf) => conf,
            Err(e) => {
                error!(error = %e, "failed to read seal configuration");
                return Err(SealError::config(format!(
                    "failed to read seal configuration: {e}"
                )));
            }
        };

        let Some(mut conf) = conf else {
            info!("seal configuration missing, not initialized");
            return Ok(None);
        };

        (self.upgrade_check)(&self.barrier_type, &mut conf);

        if conf.seal_type != self.barrier_type.as_str() {
            error!(
                seal_type = %conf.seal_type,
                loaded_type = %self.barrier_type,
                "barrier seal type does not match loaded type"
            );
            return Err(SealError::config(format!(
                "barrier seal type of {:?} does not match loaded type of {:?}",
                conf.seal_type,
                self.barrier_type.as_str()
            )));
        }

        self.barrier_config.store(Some(conf.clone()));
        Ok(Some(conf))
    }

    /// Persist and cache `conf`, stamping the barrier seal type. `None`
    /// clears the cache only; the stored entry is left as is.
    pub async fn set_barrier_config(
        &self,
        core: &dyn SealCore,
        conf: Option<SealConfig>,
    ) -> SealResult<()> {
        let Some(mut conf) = conf else {
            self.barrier_config.store(None);
            return Ok(());
        };

        conf.seal_type = self.barrier_type.to_string();

        let entry = conf.to_entry(BARRIER_SEAL_CONFIG_PATH)?;
        if let Err(e) = core.physical().put(entry).await {
            error!(error = %e, "failed to write seal configuration");
            return Err(SealError::config(format!(
                "failed to write seal configuration: {e}"
            )));
        }

        self.barrier_config.store(Some(conf));
        Ok(())
    }

    /// Replace the cached barrier config without touching storage.
    pub fn set_cached_barrier_config(&self, conf: Option<SealConfig>) {
        self.barrier_config.store(conf);
    }

    // ========== Recovery Config ==========

    /// Cached recovery config, else the stored one. While unsealed, falls
    /// back to the legacy barrier location.
    pub async fn recovery_config(&self, core: &dyn SealCore) -> SealResult<Option<SealConfig>> {
        if let Some(cfg) = self.recovery_config.load() {
            return Ok(Some(cfg));
        }

        let conf =
            match read_config(core.physical().as_ref(), RECOVERY_SEAL_CONFIG_PLAINTEXT_PATH).await
            {
                Ok(conf) => conf,
                Err(e) => {
                    error!(error = %e, "failed to read recovery seal configuration");
                    return Err(SealError::config(format!(
                        "failed to read recovery seal configuration: {e}"
                    )));
                }
            };

        let conf = match conf {
            Some(conf) => conf,
            None => {
                if core.sealed() {
                    info!("recovery seal configuration missing, but cannot check old path as core is sealed");
                    return Ok(None);
                }

                // An upgraded standby may still only have the old location.
                let old = read_config(core.barrier().as_ref(), RECOVERY_SEAL_CONFIG_PATH)
                    .await
                    .map_err(|e| {
                        SealError::config(format!(
                            "failed to read old recovery seal configuration: {e}"
                        ))
                    })?;
                match old {
                    Some(conf) => conf,
                    None => {
                        info!("recovery seal configuration missing, not initialized");
                        return Ok(None);
                    }
                }
            }
        };

        if !SealConfigType::Recovery.is_same_as(&conf.seal_type) {
            error!(
                seal_type = %conf.seal_type,
                loaded_type = %SealConfigType::Recovery,
                "recovery seal type does not match loaded type"
            );
            return Err(SealError::config(format!(
                "recovery seal type of {:?} does not match loaded type of {:?}",
                conf.seal_type,
                SealConfigType::RECOVERY
            )));
        }

        self.recovery_config.store(Some(conf.clone()));
        Ok(Some(conf))
    }

    /// Migrate any legacy entry, then persist and cache `conf` stamped with
    /// the recovery type. `None` clears the cache only.
    pub async fn set_recovery_config(
        &self,
        core: &dyn SealCore,
        conf: Option<SealConfig>,
    ) -> SealResult<()> {
        self.migrate_recovery_config(core).await?;

        let Some(mut conf) = conf else {
            self.recovery_config.store(None);
            return Ok(());
        };

        conf.seal_type = SealConfigType::Recovery.to_string();

        let entry = conf.to_entry(RECOVERY_SEAL_CONFIG_PLAINTEXT_PATH)?;
        if let Err(e) = core.physical().put(entry).await {
            error!(error = %e, "failed to write recovery seal configuration");
            return Err(SealError::config(format!(
                "failed to write recovery seal configuration: {e}"
            )));
        }

        self.recovery_config.store(Some(conf));
        Ok(())
    }

    /// Replace the cached recovery config without touching storage.
    pub fn set_cached_recovery_config(&self, conf: Option<SealConfig>) {
        self.recovery_config.store(conf);
    }

    /// Move the recovery config from its legacy barrier location to the
    /// plaintext location. No-op when there is no legacy entry. Safe to
    /// re-run after a partial migration.
    pub async fn migrate_recovery_config(&self, core: &dyn SealCore) -> SealResult<()> {
        let barrier = core.barrier();
        let legacy = barrier.get(RECOVERY_SEAL_CONFIG_PATH).await.map_err(|e| {
            SealError::config(format!(
                "failed to read old recovery seal configuration during migration: {e}"
            ))
        })?;

        let Some(legacy) = legacy else {
            return Ok(());
        };

        debug!("migrating recovery seal configuration");

        core.physical()
            .put(Entry::new(RECOVERY_SEAL_CONFIG_PLAINTEXT_PATH, legacy.value))
            .await
            .map_err(|e| {
                SealError::config(format!(
                    "failed to write recovery seal configuration during migration: {e}"
                ))
            })?;

        barrier.delete(RECOVERY_SEAL_CONFIG_PATH).await.map_err(|e| {
            SealError::config(format!(
                "failed to delete old recovery seal configuration during migration: {e}"
            ))
        })?;

        debug!("done migrating recovery seal configuration");
        Ok(())
    }
}

async fn read_config(backend: &dyn PhysicalBackend, path: &str) -> SealResult<Option<SealConfig>> {
    let entry = backend
        .get(path)
        .await
        .map_err(|e| SealError::config(e.to_string()))?;
    entry.as_ref().map(SealConfig::from_entry).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_core, TestCore};

    fn store(kind: &str) -> ConfigStore {
        ConfigStore::new(SealConfigType::Backend(kind.to_string()))
    }

    async fn seed(backend: &dyn PhysicalBackend, path: &str, cfg: &SealConfig) {
        backend.put(cfg.to_entry(path).unwrap()).await.unwrap();
    }

    #[test]
    fn recovery_type_comparison_is_loose() {
        assert!(SealConfigType::Recovery.is_same_as("recovery"));
        assert!(SealConfigType::Recovery.is_same_as("RECOVERY"));
        assert!(SealConfigType::Recovery.is_same_as(" Re-covery"));
        assert!(!SealConfigType::Recovery.is_same_as("shamir"));
        assert_eq!(SealConfigType::Multiseal.to_string(), "multiseal");
    }

    #[test]
    fn seal_config_keeps_unknown_fields() {
        let raw = r#"{"type":"awskms","secret_shares":1,"secret_threshold":1,"kms_key_id":"alias/x"}"#;
        let cfg: SealConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.seal_type, "awskms");
        assert_eq!(cfg.extra["kms_key_id"], "alias/x");

        let back = serde_json::to_value(&cfg).unwrap();
        assert_eq!(back["kms_key_id"], "alias/x");
        assert_eq!(back["type"], "awskms");
    }

    #[tokio::test]
    async fn barrier_config_missing_is_not_initialized() {
        let TestCore { core, .. } = test_core();
        assert_eq!(store("aead").barrier_config(core.as_ref()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_barrier_config_stamps_type_and_persists() {
        let TestCore { core, physical, .. } = test_core();
        let configs = store("aead");

        let mut cfg = SealConfig::new(1, 1);
        cfg.seal_type = "something-else".to_string();
        configs
            .set_barrier_config(core.as_ref(), Some(cfg))
            .await
            .unwrap();

        let loaded = configs.barrier_config(core.as_ref()).await.unwrap().unwrap();
        assert_eq!(loaded.seal_type, "aead");

        // a fresh store reads it back from storage
        let fresh = store("aead");
        let stored = fresh.barrier_config(core.as_ref()).await.unwrap().unwrap();
        assert_eq!(stored, loaded);
        assert!(physical.keys().contains(&BARRIER_SEAL_CONFIG_PATH.to_string()));
    }

    #[tokio::test]
    async fn barrier_type_mismatch_is_config_error() {
        let TestCore { core, physical, .. } = test_core();
        let mut cfg = SealConfig::new(1, 1);
        cfg.seal_type = "awskms".to_string();
        seed(physical.as_ref(), BARRIER_SEAL_CONFIG_PATH, &cfg).await;

        let err = store("aead").barrier_config(core.as_ref()).await.unwrap_err();
        assert!(matches!(err, SealError::Config(_)));

        // the comparison is exact for barrier types
        cfg.seal_type = "AEAD".to_string();
        seed(physical.as_ref(), BARRIER_SEAL_CONFIG_PATH, &cfg).await;
        assert!(store("aead").barrier_config(core.as_ref()).await.is_err());
    }

    #[tokio::test]
    async fn upgrade_check_runs_before_type_comparison() {
        let TestCore { core, physical, .. } = test_core();
        let mut cfg = SealConfig::new(1, 1);
        cfg.seal_type = "legacy-kms".to_string();
        seed(physical.as_ref(), BARRIER_SEAL_CONFIG_PATH, &cfg).await;

        let mut configs = store("aead");
        configs.set_upgrade_check(Arc::new(|kind, conf| {
            if conf.seal_type == "legacy-kms" {
                conf.seal_type = kind.to_string();
            }
        }));
        let loaded = configs.barrier_config(core.as_ref()).await.unwrap().unwrap();
        assert_eq!(loaded.seal_type, "aead");
    }

    #[tokio::test]
    async fn clearing_barrier_config_keeps_storage() {
        let TestCore { core, physical, .. } = test_core();
        let configs = store("aead");
        configs
            .set_barrier_config(core.as_ref(), Some(SealConfig::new(1, 1)))
            .await
            .unwrap();

        configs.set_barrier_config(core.as_ref(), None).await.unwrap();
        assert!(physical.get(BARRIER_SEAL_CONFIG_PATH).await.unwrap().is_some());
        // reloaded from storage
        assert!(configs.barrier_config(core.as_ref()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_unchanged() {
        let TestCore { core, physical, .. } = test_core();
        let configs = store("aead");
        configs
            .set_barrier_config(core.as_ref(), Some(SealConfig::new(1, 1)))
            .await
            .unwrap();

        physical.set_fail_writes(true);
        let err = configs
            .set_barrier_config(core.as_ref(), Some(SealConfig::new(5, 3)))
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::Config(_)));

        let cached = configs.barrier_config(core.as_ref()).await.unwrap().unwrap();
        assert_eq!(cached.secret_shares, 1);
    }

    #[tokio::test]
    async fn read_failure_is_config_error() {
        let TestCore { core, physical, .. } = test_core();
        physical.set_fail_reads(true);
        assert!(matches!(
            store("aead").barrier_config(core.as_ref()).await,
            Err(SealError::Config(_))
        ));
    }

    #[tokio::test]
    async fn cache_returns_copies() {
        let TestCore { core, .. } = test_core();
        let configs = store("aead");
        configs
            .set_barrier_config(core.as_ref(), Some(SealConfig::new(1, 1)))
            .await
            .unwrap();

        let mut copy = configs.barrier_config(core.as_ref()).await.unwrap().unwrap();
        copy.secret_shares = 99;
        let again = configs.barrier_config(core.as_ref()).await.unwrap().unwrap();
        assert_eq!(again.secret_shares, 1);
    }

    #[tokio::test]
    async fn recovery_config_roundtrip_and_type() {
        let TestCore { core, .. } = test_core();
        let configs = store("aead");
        configs
            .set_recovery_config(core.as_ref(), Some(SealConfig::new(5, 3)))
            .await
            .unwrap();

        let fresh = store("aead");
        let loaded = fresh.recovery_config(core.as_ref()).await.unwrap().unwrap();
        assert_eq!(loaded.seal_type, "recovery");
        assert_eq!(loaded.secret_threshold, 3);
    }

    #[tokio::test]
    async fn recovery_type_mismatch_is_config_error() {
        let TestCore { core, physical, .. } = test_core();
        let mut cfg = SealConfig::new(1, 1);
        cfg.seal_type = "shamir".to_string();
        seed(physical.as_ref(), RECOVERY_SEAL_CONFIG_PLAINTEXT_PATH, &cfg).await;
        assert!(matches!(
            store("aead").recovery_config(core.as_ref()).await,
            Err(SealError::Config(_))
        ));
    }

    #[tokio::test]
    async fn recovery_config_falls_back_to_legacy_only_when_unsealed() {
        let TestCore {
            core, standalone, barrier, ..
        } = test_core();
        let mut legacy = SealConfig::new(3, 2);
        legacy.seal_type = "recovery".to_string();
        seed(barrier.as_ref(), RECOVERY_SEAL_CONFIG_PATH, &legacy).await;

        standalone.set_sealed(true);
        assert_eq!(store("aead").recovery_config(core.as_ref()).await.unwrap(), None);

        standalone.set_sealed(false);
        let loaded = store("aead").recovery_config(core.as_ref()).await.unwrap().unwrap();
        assert_eq!(loaded.secret_shares, 3);
    }

    #[tokio::test]
    async fn set_recovery_config_migrates_legacy_entry() {
        let TestCore {
            core, physical, barrier, ..
        } = test_core();
        let mut legacy = SealConfig::new(3, 2);
        legacy.seal_type = "recovery".to_string();
        seed(barrier.as_ref(), RECOVERY_SEAL_CONFIG_PATH, &legacy).await;

        let configs = store("aead");
        configs
            .set_recovery_config(core.as_ref(), Some(SealConfig::new(5, 4)))
            .await
            .unwrap();

        assert!(barrier.get(RECOVERY_SEAL_CONFIG_PATH).await.unwrap().is_none());
        let loaded = store("aead").recovery_config(core.as_ref()).await.unwrap().unwrap();
        assert_eq!(loaded.secret_shares, 5);
        assert_eq!(loaded.secret_threshold, 4);
        assert!(physical
            .get(RECOVERY_SEAL_CONFIG_PLAINTEXT_PATH)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn clearing_recovery_config_still_migrates() {
        let TestCore {
            core, physical, barrier, ..
        } = test_core();
        let mut legacy = SealConfig::new(3, 2);
        legacy.seal_type = "recovery".to_string();
        seed(barrier.as_ref(), RECOVERY_SEAL_CONFIG_PATH, &legacy).await;

        store("aead").set_recovery_config(core.as_ref(), None).await.unwrap();

        assert!(barrier.get(RECOVERY_SEAL_CONFIG_PATH).await.unwrap().is_none());
        let moved = physical
            .get(RECOVERY_SEAL_CONFIG_PLAINTEXT_PATH)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(SealConfig::from_entry(&moved).unwrap().secret_shares, 3);
    }

    #[tokio::test]
    async fn migration_is_noop_without_legacy_and_rerunnable() {
        let TestCore {
            core, physical, barrier, ..
        } = test_core();
        let configs = store("aead");
        configs.migrate_recovery_config(core.as_ref()).await.unwrap();
        assert!(physical.keys().is_empty());

        // copied but not deleted: running again converges
        let mut legacy = SealConfig::new(2, 2);
        legacy.seal_type = "recovery".to_string();
        seed(barrier.as_ref(), RECOVERY_SEAL_CONFIG_PATH, &legacy).await;
        seed(physical.as_ref(), RECOVERY_SEAL_CONFIG_PLAINTEXT_PATH, &legacy).await;
        configs.migrate_recovery_config(core.as_ref()).await.unwrap();
        assert!(barrier.get(RECOVERY_SEAL_CONFIG_PATH).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn migration_failure_aborts_set() {
        let TestCore {
            core, barrier, ..
        } = test_core();
        let mut legacy = SealConfig::new(3, 2);
        legacy.seal_type = "recovery".to_string();
        seed(barrier.as_ref(), RECOVERY_SEAL_CONFIG_PATH, &legacy).await;
        barrier.set_fail_deletes(true);

        let configs = store("aead");
        let err = configs
            .set_recovery_config(core.as_ref(), Some(SealConfig::new(5, 4)))
            .await
            .unwrap_err();
        assert!(matches!(err, SealError::Config(_)));
        assert!(configs.recovery_config.load().is_none());
    }
}
