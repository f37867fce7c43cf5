// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Physical Storage
//!
//! Key/value entries addressed by path. The auto-unseal manager never owns a
//! storage engine: the server hands it a [`PhysicalBackend`] for the plaintext
//! physical layer and a second one for the (legacy) barrier view.
//!
//! ## Layout
//!
//! ```text
//! core/
//!   seal-config                # barrier SealConfig (JSON)
//!   recovery-config            # recovery SealConfig (JSON)
//!   recovery-seal-config       # legacy recovery SealConfig, barrier view only
//!   recovery-key               # SealWrappedValue of the recovery key
//!   hsm/barrier-unseal-keys    # SealWrappedValue of the root key shares
//! ```
//!
//! ## Backends
//!
//! - [`InMemoryBackend`] - `BTreeMap` behind a lock, for tests and embedding
//! - [`RedbBackend`] - embedded ACID database used by the daemon

pub mod memory;
pub mod paths;
pub mod redb_backend;

use async_trait::async_trait;

pub use memory::InMemoryBackend;
pub use redb_backend::RedbBackend;

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Error type for physical storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    /// Backend cannot serve requests (lock poisoned, injected fault, ...).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// An entry the caller required is absent.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Key/value storage by path. Implementations must be safe for concurrent use.
#[async_trait]
pub trait PhysicalBackend: Send + Sync {
    /// Fetch the entry at `key`, `None` when absent.
    async fn get(&self, key: &str) -> StorageResult<Option<Entry>>;

    /// Create or replace an entry.
    async fn put(&self, entry: Entry) -> StorageResult<()>;

    /// Remove the entry at `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}
