// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Auto-Unseal Manager
//!
//! [`AutoSeal`] is the object the server talks to. It is constructed from a
//! [`SealAccess`], bound to a server with [`AutoSeal::set_core`], and then
//! delegates config operations to [`ConfigStore`], key operations to
//! [`KeyStore`] and background health checking to [`HealthMonitor`].
//!
//! ## Lifecycle
//!
//! ```text
//! new -> set_core -> init -> {config/key ops, start/stop health check} -> finalize
//! ```
//!
//! Every operation that touches storage fails with [`SealError::NotBound`]
//! until a core is set.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::access::SealAccess;
use super::config::{BarrierTypeUpgradeCheck, ConfigStore, SealConfig, SealConfigType};
use super::health::{HealthMonitor, HealthState};
use super::keys::KeyStore;
use crate::config::HealthCheckConfig;
use crate::core::SealCore;
use crate::error::{SealError, SealResult};

/// How a seal supports storing the root key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredKeysSupport {
    /// Stored keys are wrapped by the seal and unwrapped on unseal.
    Generic,
}

/// Point-in-time view of one backend, for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub seal_type: String,
    pub priority: usize,
    pub disabled: bool,
    pub healthy: bool,
    pub last_seen_healthy: DateTime<Utc>,
    pub last_health_check: Option<DateTime<Utc>>,
}

/// Auto-unseal manager.
pub struct AutoSeal {
    access: Arc<dyn SealAccess>,
    configs: ConfigStore,
    keys: KeyStore,
    core: RwLock<Option<Arc<dyn SealCore>>>,
    health_config: HealthCheckConfig,
    health: Arc<HealthState>,
    health_stop: Mutex<Option<CancellationToken>>,
}

impl AutoSeal {
    /// Create a manager over `access`. The barrier seal type is `multiseal`
    /// when more than one backend is configured, else the single backend's
    /// declared type. An access without any backend is rejected.
    pub fn new(access: Arc<dyn SealAccess>) -> SealResult<Self> {
        let generation = access.seal_generation_info();
        let barrier_type = match generation.seals.as_slice() {
            [] => return Err(SealError::validation("seal access has no backends configured")),
            [single] => SealConfigType::Backend(single.seal_type.clone()),
            _ => SealConfigType::Multiseal,
        };
        let health_config = HealthCheckConfig::default();

        Ok(Self {
            configs: ConfigStore::new(barrier_type),
            keys: KeyStore::new(access.clone()),
            access,
            core: RwLock::new(None),
            health: Arc::new(HealthState::new(health_config.nominal_interval)),
            health_config,
            health_stop: Mutex::new(None),
        })
    }

    /// Replace the health check intervals and timeout.
    pub fn with_health_config(mut self, config: HealthCheckConfig) -> Self {
        self.health = Arc::new(HealthState::new(config.nominal_interval));
        self.health_config = config;
        self
    }

    /// Install a hook run on every loaded barrier config before its type is
    /// compared with the configured seal type.
    pub fn with_barrier_type_upgrade_check(mut self, check: BarrierTypeUpgradeCheck) -> Self {
        self.configs.set_upgrade_check(check);
        self
    }

    // ========== Binding ==========

    pub fn set_core(&self, core: Arc<dyn SealCore>) {
        *self.core.write().unwrap_or_else(PoisonError::into_inner) = Some(core);
    }

    pub fn core(&self) -> SealResult<Arc<dyn SealCore>> {
        self.core
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SealError::NotBound)
    }

    // ========== Lifecycle ==========

    pub async fn init(&self) -> SealResult<()> {
        self.access.init().await
    }

    /// Stop the health check and finalize every backend.
    pub async fn finalize(&self) -> SealResult<()> {
        self.stop_health_check();
        self.access.finalize().await
    }

    // ========== Capabilities ==========

    pub fn access(&self) -> &Arc<dyn SealAccess> {
        &self.access
    }

    pub fn barrier_seal_config_type(&self) -> &SealConfigType {
        self.configs.barrier_type()
    }

    pub fn recovery_seal_config_type(&self) -> SealConfigType {
        SealConfigType::Recovery
    }

    pub fn stored_keys_supported(&self) -> StoredKeysSupport {
        StoredKeysSupport::Generic
    }

    pub fn recovery_key_supported(&self) -> bool {
        true
    }

    pub fn seal_wrappable(&self) -> bool {
        true
    }

    // ========== Seal Configs ==========

    pub async fn barrier_config(&self) -> SealResult<Option<SealConfig>> {
        let core = self.core()?;
        self.configs.barrier_config(core.as_ref()).await
    }

    pub async fn set_barrier_config(&self, conf: Option<SealConfig>) -> SealResult<()> {
        let core = self.core()?;
        self.configs.set_barrier_config(core.as_ref(), conf).await
    }

    pub async fn clear_barrier_config(&self) -> SealResult<()> {
        self.set_barrier_config(None).await
    }

    pub fn set_cached_barrier_config(&self, conf: Option<SealConfig>) {
        self.configs.set_cached_barrier_config(conf);
    }

    pub async fn recovery_config(&self) -> SealResult<Option<SealConfig>> {
        let core = self.core()?;
        self.configs.recovery_config(core.as_ref()).await
    }

    pub async fn set_recovery_config(&self, conf: Option<SealConfig>) -> SealResult<()> {
        let core = self.core()?;
        self.configs.set_recovery_config(core.as_ref(), conf).await
    }

    pub async fn clear_recovery_config(&self) -> SealResult<()> {
        self.set_recovery_config(None).await
    }

    pub fn set_cached_recovery_config(&self, conf: Option<SealConfig>) {
        self.configs.set_cached_recovery_config(conf);
    }

    // ========== Keys ==========

    pub async fn set_stored_keys(&self, keys: &[Vec<u8>]) -> SealResult<()> {
        let core = self.core()?;
        self.keys.set_stored_keys(core.physical().as_ref(), keys).await
    }

    pub async fn stored_keys(&self) -> SealResult<Vec<Vec<u8>>> {
        let core = self.core()?;
        self.keys.stored_keys(core.physical().as_ref()).await
    }

    pub async fn set_recovery_key(&self, key: &[u8]) -> SealResult<()> {
        let core = self.core()?;
        self.keys.set_recovery_key(core.physical().as_ref(), key).await
    }

    pub async fn recovery_key(&self) -> SealResult<Vec<u8>> {
        let core = self.core()?;
        self.keys.recovery_key(core.physical().as_ref()).await
    }

    pub async fn verify_recovery_key(&self, key: &[u8]) -> SealResult<()> {
        let core = self.core()?;
        self.keys
            .verify_recovery_key(core.physical().as_ref(), key)
            .await
    }

    pub async fn upgrade_keys(&self) -> SealResult<()> {
        let core = self.core()?;
        self.keys.upgrade_keys(core.physical().as_ref()).await
    }

    // ========== Health ==========

    /// Whether every backend passed its last health check.
    pub fn healthy(&self) -> bool {
        self.health.is_healthy()
    }

    /// Delay the health check waits before its next pass.
    pub fn health_check_interval(&self) -> Duration {
        self.health.interval()
    }

    /// Start the background health check, replacing any running one.
    /// Fails with [`SealError::NoRuntime`] outside a tokio runtime.
    pub fn start_health_check(&self) -> SealResult<()> {
        let core = self.core()?;
        let runtime = Handle::try_current().map_err(|e| SealError::NoRuntime(e.to_string()))?;
        let mut stop_slot = self.health_stop.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = stop_slot.take() {
            previous.cancel();
        }

        let stop = CancellationToken::new();
        let monitor = HealthMonitor::new(
            self.access.clone(),
            self.health_config,
            self.health.clone(),
        );
        runtime.spawn(monitor.run(stop.clone(), core));
        *stop_slot = Some(stop);
        Ok(())
    }

    /// Stop the background health check. No-op when it is not running.
    pub fn stop_health_check(&self) {
        let stop = self
            .health_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stop) = stop {
            info!("stopping seal health check");
            stop.cancel();
        }
    }

    /// Snapshot of every backend in priority order.
    pub async fn backend_status(&self) -> Vec<BackendStatus> {
        let mut status = Vec::new();
        for backend in self.access.all_seal_info_by_priority() {
            let health = backend.health().await;
            status.push(BackendStatus {
                name: backend.name().to_string(),
                seal_type: backend.seal_type().to_string(),
                priority: backend.priority(),
                disabled: backend.is_disabled(),
                healthy: health.healthy,
                last_seen_healthy: health.last_seen_healthy,
                last_health_check: health.last_health_check,
            });
        }
        status
    }
}

impl Drop for AutoSeal {
    fn drop(&mut self) {
        self.stop_health_check();
    }
}
