// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable storage backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `physical`: path → raw value bytes
//! - `barrier`: path → raw value bytes (legacy barrier view, read during
//!   recovery config migration)
//!
//! Both views share one database file so a migration that copies an entry
//! and deletes the legacy one touches a single file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, TableDefinition};

use super::{Entry, PhysicalBackend, StorageError, StorageResult};

// =============================================================================
// Table Definitions
// =============================================================================

/// Physical entries: path → value bytes.
const PHYSICAL: TableDefinition<&str, &[u8]> = TableDefinition::new("physical");

/// Barrier view entries: path → value bytes.
const BARRIER: TableDefinition<&str, &[u8]> = TableDefinition::new("barrier");

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

// =============================================================================
// RedbBackend
// =============================================================================

/// One table of a shared redb database exposed as a [`PhysicalBackend`].
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    table: Table,
}

impl RedbBackend {
    /// Open (or create) the database at the given path and return its
    /// physical view.
    pub fn open(path: &Path) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Unavailable(format!(
                    "failed to create data directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PHYSICAL)?;
            let _ = write_txn.open_table(BARRIER)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            table: PHYSICAL,
        })
    }

    /// Barrier view over the same database file.
    pub fn barrier_view(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            table: BARRIER,
        }
    }

    /// Run a redb transaction on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database, Table) -> StorageResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let table = self.table;
        tokio::task::spawn_blocking(move || op(&db, table))
            .await
            .map_err(|e| StorageError::Unavailable(format!("storage task failed: {e}")))?
    }
}

#[async_trait]
impl PhysicalBackend for RedbBackend {
    async fn get(&self, key: &str) -> StorageResult<Option<Entry>> {
        let key = key.to_string();
        self.blocking(move |db, table| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(table)?;
            let value = table.get(key.as_str())?.map(|v| v.value().to_vec());
            Ok(value.map(|value| Entry::new(key, value)))
        })
        .await
    }

    async fn put(&self, entry: Entry) -> StorageResult<()> {
        self.blocking(move |db, table| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(table)?;
                table.insert(entry.key.as_str(), entry.value.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = key.to_string();
        self.blocking(move |db, table| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(table)?;
                table.remove(key.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }
}
