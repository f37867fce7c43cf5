// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process storage backend.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{Entry, PhysicalBackend, StorageError, StorageResult};

/// `BTreeMap`-backed [`PhysicalBackend`]. Every operation replaces or reads a
/// whole value under the lock, so readers never see a partial write.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, in order.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn poisoned() -> StorageError {
        StorageError::Unavailable("in-memory storage lock poisoned".to_string())
    }
}

#[async_trait]
impl PhysicalBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> StorageResult<Option<Entry>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).map(|value| Entry::new(key, value.clone())))
    }

    async fn put(&self, entry: Entry) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(entry.key, entry.value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }
}
