// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `autoseald` - standalone auto-unseal daemon.
//!
//! Wires redb storage and the local AEAD seal into an [`AutoSeal`], then
//! keeps the seal backends under health check until Ctrl-C.
//!
//! On first start (no barrier seal config) a root key and a recovery key are
//! generated, wrapped and stored; the recovery key is printed once. Later
//! starts re-wrap any key material written under an older seal key.

use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::info;

use relational_autoseal::config::{
    HealthCheckConfig, AEAD_KEY_ENV, DATA_DIR_ENV, DEFAULT_DATA_DIR, DEFAULT_SEAL_NAME,
    SEAL_NAME_ENV,
};
use relational_autoseal::core::StandaloneCore;
use relational_autoseal::logging::init_tracing;
use relational_autoseal::metrics::TracingMetricSink;
use relational_autoseal::seal::aead::AEAD_KEY_LEN;
use relational_autoseal::seal::{AeadWrapper, AutoSeal, MultiSealAccess, SealBackendInfo, SealConfig};
use relational_autoseal::storage::paths::DATABASE_FILE;
use relational_autoseal::storage::RedbBackend;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let data_dir = env::var(DATA_DIR_ENV).unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
    let seal_name = env::var(SEAL_NAME_ENV).unwrap_or_else(|_| DEFAULT_SEAL_NAME.to_string());
    let key = env::var(AEAD_KEY_ENV).map_err(|_| format!("{AEAD_KEY_ENV} must be set"))?;
    let key = Base64::decode_vec(key.trim()).map_err(|e| format!("invalid {AEAD_KEY_ENV}: {e}"))?;

    // Storage
    let db_path = PathBuf::from(&data_dir).join(DATABASE_FILE);
    let physical = RedbBackend::open(&db_path)?;
    let barrier = physical.barrier_view();
    info!(path = %db_path.display(), "opened seal storage");

    let core = Arc::new(StandaloneCore::new(
        Arc::new(physical),
        Arc::new(barrier),
        Arc::new(TracingMetricSink),
    ));

    // Seal
    let wrapper = Arc::new(AeadWrapper::new(&key)?);
    let access = MultiSealAccess::single(SealBackendInfo::new(seal_name.as_str(), 1, wrapper))?;
    let seal = AutoSeal::new(Arc::new(access))?.with_health_config(HealthCheckConfig::from_env());
    seal.set_core(core.clone());
    seal.init().await?;

    match seal.barrier_config().await? {
        None => initialize(&seal).await?,
        Some(_) => {
            seal.upgrade_keys().await?;
            let shares = seal.stored_keys().await?;
            info!(shares = shares.len(), "stored keys unwrapped");
        }
    }

    seal.start_health_check()?;
    info!(seal_name = %seal_name, seal_type = %seal.barrier_seal_config_type(), "autoseal running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    core.shutdown();
    seal.finalize().await?;
    Ok(())
}

/// Generate, wrap and persist a fresh root key and recovery key.
async fn initialize(seal: &AutoSeal) -> Result<(), Box<dyn Error>> {
    info!("no seal configuration found, initializing");
    let rng = SystemRandom::new();
    let root_key = random_key(&rng)?;
    let recovery_key = random_key(&rng)?;

    let mut barrier = SealConfig::new(1, 1);
    barrier.stored_shares = 1;
    seal.set_barrier_config(Some(barrier)).await?;
    seal.set_recovery_config(Some(SealConfig::new(1, 1))).await?;

    seal.set_stored_keys(&[root_key]).await?;
    seal.set_recovery_key(&recovery_key).await?;
    seal.verify_recovery_key(&recovery_key).await?;

    println!("Recovery key (shown once): {}", Base64::encode_string(&recovery_key));
    info!("seal initialized");
    Ok(())
}

fn random_key(rng: &SystemRandom) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut key = vec![0u8; AEAD_KEY_LEN];
    rng.fill(&mut key).map_err(|_| "failed to generate random key")?;
    Ok(key)
}
