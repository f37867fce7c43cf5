// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! by the auto-unseal daemon. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the redb database | `/data` |
//! | `AUTOSEAL_AEAD_KEY` | Base64 AES-256 key for the local AEAD seal | Required |
//! | `AUTOSEAL_SEAL_NAME` | Name of the local seal backend | `aead` |
//! | `AUTOSEAL_HEALTH_NOMINAL_SECS` | Health check interval while healthy | `600` |
//! | `AUTOSEAL_HEALTH_UNHEALTHY_SECS` | Health check interval while any backend is unhealthy | `60` |
//! | `AUTOSEAL_HEALTH_TIMEOUT_SECS` | Timeout for each encrypt/decrypt check | `60` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::time::Duration;

/// Environment variable name for the data directory path.
///
/// # Default
/// `/data` (encrypted mount point in the Gramine manifest)
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Base64 (standard, padded) 32-byte key for the local AEAD seal backend.
pub const AEAD_KEY_ENV: &str = "AUTOSEAL_AEAD_KEY";

pub const SEAL_NAME_ENV: &str = "AUTOSEAL_SEAL_NAME";

pub const DEFAULT_SEAL_NAME: &str = "aead";

pub const HEALTH_NOMINAL_SECS_ENV: &str = "AUTOSEAL_HEALTH_NOMINAL_SECS";
pub const HEALTH_UNHEALTHY_SECS_ENV: &str = "AUTOSEAL_HEALTH_UNHEALTHY_SECS";
pub const HEALTH_TIMEOUT_SECS_ENV: &str = "AUTOSEAL_HEALTH_TIMEOUT_SECS";

/// Logging format selector (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Interval between health checks while every seal backend is healthy.
pub const DEFAULT_HEALTH_NOMINAL_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Interval between health checks while any seal backend is unhealthy.
pub const DEFAULT_HEALTH_UNHEALTHY_INTERVAL: Duration = Duration::from_secs(60);

/// Bound on each encrypt or decrypt call made by the health check.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(60);

/// Timing of the seal health check loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckConfig {
    pub nominal_interval: Duration,
    pub unhealthy_interval: Duration,
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            nominal_interval: DEFAULT_HEALTH_NOMINAL_INTERVAL,
            unhealthy_interval: DEFAULT_HEALTH_UNHEALTHY_INTERVAL,
            timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }
}

impl HealthCheckConfig {
    /// Read overrides from the environment; missing, unparsable or zero
    /// values keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secs = |name: &str, default: Duration| {
            lookup(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        Self {
            nominal_interval: secs(HEALTH_NOMINAL_SECS_ENV, DEFAULT_HEALTH_NOMINAL_INTERVAL),
            unhealthy_interval: secs(HEALTH_UNHEALTHY_SECS_ENV, DEFAULT_HEALTH_UNHEALTHY_INTERVAL),
            timeout: secs(HEALTH_TIMEOUT_SECS_ENV, DEFAULT_HEALTH_TIMEOUT),
        }
    }
}
