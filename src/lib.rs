// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Autoseal - KMS-backed auto-unseal manager
//!
//! Protects the root key shares and the recovery key by wrapping them with
//! one or more external seal backends, persists the barrier and recovery
//! seal configurations, and health-checks the backends in the background.
//!
//! ## Modules
//!
//! - `seal` - seal backends, key/config stores and the `AutoSeal` manager
//! - `storage` - physical storage trait, redb and in-memory backends
//! - `core` - what the manager needs from the server it is bound to
//! - `metrics` - gauge sink used by the health check
//! - `config` - environment configuration
//! - `logging` - tracing subscriber setup

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod seal;
pub mod storage;

#[cfg(test)]
mod testing;

pub use error::{SealError, SealResult};
