// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Seal backends and the auto-unseal manager built on them.
//!
//! ## Modules
//!
//! - `access` - backend capability traits and per-backend health state
//! - `multi` - priority-ordered access over several backends
//! - `aead` - in-process AES-256-GCM backend
//! - `wrapped` - seal-wrapped value format and key codecs
//! - `config` - barrier and recovery seal config persistence
//! - `keys` - stored root key shares and recovery key
//! - `health` - background backend health check
//! - `autoseal` - the manager facade

pub mod access;
pub mod aead;
pub mod autoseal;
pub mod config;
pub mod health;
pub mod keys;
pub mod multi;
pub mod wrapped;

pub use access::{
    BackendHealth, SealAccess, SealBackendInfo, SealGenerationInfo, SealKmsConfig, SealWrapper,
};
pub use aead::AeadWrapper;
pub use autoseal::{AutoSeal, BackendStatus, StoredKeysSupport};
pub use config::{BarrierTypeUpgradeCheck, ConfigStore, SealConfig, SealConfigType};
pub use health::{HealthMonitor, HealthState};
pub use keys::KeyStore;
pub use multi::MultiSealAccess;
pub use wrapped::{BlobInfo, SealWrappedValue};
