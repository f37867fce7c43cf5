// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fault-injecting collaborators shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{SealCore, StandaloneCore};
use crate::error::{SealError, SealResult};
use crate::metrics::InMemoryMetricSink;
use crate::seal::aead::AeadWrapper;
use crate::seal::wrapped::BlobInfo;
use crate::seal::SealWrapper;
use crate::storage::{Entry, InMemoryBackend, PhysicalBackend, StorageError, StorageResult};

/// AEAD wrapper whose encrypt/decrypt can be made to fail, hang or lie.
pub struct FlakyWrapper {
    seal_type: String,
    inner: AeadWrapper,
    fail_encrypt: AtomicBool,
    fail_decrypt: AtomicBool,
    corrupt_decrypt: AtomicBool,
    hang: AtomicBool,
    encrypt_delay_ms: AtomicU64,
    encrypt_calls: AtomicUsize,
}

impl FlakyWrapper {
    pub fn new(seal_type: &str) -> Self {
        Self {
            seal_type: seal_type.to_string(),
            inner: AeadWrapper::generate().expect("generate test key"),
            fail_encrypt: AtomicBool::new(false),
            fail_decrypt: AtomicBool::new(false),
            corrupt_decrypt: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            encrypt_delay_ms: AtomicU64::new(0),
            encrypt_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_encrypt(&self, fail: bool) {
        self.fail_encrypt.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_decrypt(&self, fail: bool) {
        self.fail_decrypt.store(fail, Ordering::SeqCst);
    }

    /// Decrypt succeeds but returns different bytes.
    pub fn set_corrupt_decrypt(&self, corrupt: bool) {
        self.corrupt_decrypt.store(corrupt, Ordering::SeqCst);
    }

    /// Encrypt never completes.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Encrypt succeeds, but only after `delay`.
    pub fn set_encrypt_delay(&self, delay: Duration) {
        self.encrypt_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn rotate_key(&self) -> String {
        self.inner.rotate_key().expect("rotate test key")
    }
}

#[async_trait]
impl SealWrapper for FlakyWrapper {
    fn seal_type(&self) -> &str {
        &self.seal_type
    }

    async fn key_id(&self) -> SealResult<String> {
        self.inner.key_id().await
    }

    async fn encrypt(&self, plaintext: &[u8], aad: Option<&[u8]>) -> SealResult<BlobInfo> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        }
        let delay = self.encrypt_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_encrypt.load(Ordering::SeqCst) {
            return Err(SealError::crypto("injected encrypt failure"));
        }
        self.inner.encrypt(plaintext, aad).await
    }

    async fn decrypt(&self, blob: &BlobInfo, aad: Option<&[u8]>) -> SealResult<Vec<u8>> {
        if self.fail_decrypt.load(Ordering::SeqCst) {
            return Err(SealError::crypto("injected decrypt failure"));
        }
        let mut plaintext = self.inner.decrypt(blob, aad).await?;
        if self.corrupt_decrypt.load(Ordering::SeqCst) {
            plaintext.push(0);
        }
        Ok(plaintext)
    }
}

/// In-memory backend with switchable failures and a write counter.
#[derive(Default)]
pub struct FaultyBackend {
    inner: InMemoryBackend,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    writes: AtomicUsize,
}

impl FaultyBackend {
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }
}

#[async_trait]
impl PhysicalBackend for FaultyBackend {
    async fn get(&self, key: &str) -> StorageResult<Option<Entry>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected read failure".to_string()));
        }
        self.inner.get(key).await
    }

    async fn put(&self, entry: Entry) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected write failure".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(entry).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected delete failure".to_string()));
        }
        self.inner.delete(key).await
    }
}

/// A [`StandaloneCore`] over faulty in-memory storage, with handles to
/// every part.
pub struct TestCore {
    pub core: Arc<dyn SealCore>,
    pub standalone: Arc<StandaloneCore>,
    pub physical: Arc<FaultyBackend>,
    pub barrier: Arc<FaultyBackend>,
    pub metrics: Arc<InMemoryMetricSink>,
}

pub fn test_core() -> TestCore {
    let physical = Arc::new(FaultyBackend::default());
    let barrier = Arc::new(FaultyBackend::default());
    let metrics = Arc::new(InMemoryMetricSink::new());
    let standalone = Arc::new(StandaloneCore::new(
        physical.clone(),
        barrier.clone(),
        metrics.clone(),
    ));
    TestCore {
        core: standalone.clone(),
        standalone,
        physical,
        barrier,
        metrics,
    }
}
