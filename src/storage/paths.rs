// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixed storage paths used by the auto-unseal manager.
//!
//! These are opaque keys, not filesystem paths. Changing any of them orphans
//! data written by earlier releases.

/// Barrier seal configuration (physical, plaintext JSON).
pub const BARRIER_SEAL_CONFIG_PATH: &str = "core/seal-config";

/// Recovery seal configuration, current location (physical, plaintext JSON).
pub const RECOVERY_SEAL_CONFIG_PLAINTEXT_PATH: &str = "core/recovery-config";

/// Recovery seal configuration, legacy location inside the barrier.
///
/// Only read through the barrier view; migrated to
/// [`RECOVERY_SEAL_CONFIG_PLAINTEXT_PATH`] on the next recovery config write.
pub const RECOVERY_SEAL_CONFIG_PATH: &str = "core/recovery-seal-config";

/// Root key shares, seal-wrapped.
pub const STORED_BARRIER_KEYS_PATH: &str = "core/hsm/barrier-unseal-keys";

/// Recovery key, seal-wrapped.
pub const RECOVERY_KEY_PATH: &str = "core/recovery-key";

/// File name of the redb database under `DATA_DIR`.
pub const DATABASE_FILE: &str = "autoseal.redb";
