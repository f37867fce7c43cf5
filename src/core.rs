// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Server Collaborator
//!
//! The auto-unseal manager is bound to a server after construction
//! (`AutoSeal::set_core`). Everything it needs from that server goes through
//! [`SealCore`]: physical and barrier storage, the sealed flag, the metric
//! sink and the server's active context.
//!
//! [`StandaloneCore`] is a complete implementation used by the `autoseald`
//! daemon and by tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::metrics::MetricSink;
use crate::storage::PhysicalBackend;

/// Capabilities the server provides to the auto-unseal manager.
pub trait SealCore: Send + Sync {
    /// Plaintext physical storage.
    fn physical(&self) -> Arc<dyn PhysicalBackend>;

    /// Barrier-protected storage. Only readable while unsealed; used as the
    /// source of the legacy recovery config.
    fn barrier(&self) -> Arc<dyn PhysicalBackend>;

    /// Whether the server is currently sealed.
    fn sealed(&self) -> bool;

    fn metric_sink(&self) -> Arc<dyn MetricSink>;

    /// Cancelled when the server stops serving. Cancelling it aborts
    /// in-flight seal backend calls made by the health check.
    fn active_context(&self) -> CancellationToken;
}

/// Self-contained [`SealCore`].
pub struct StandaloneCore {
    physical: Arc<dyn PhysicalBackend>,
    barrier: Arc<dyn PhysicalBackend>,
    metrics: Arc<dyn MetricSink>,
    sealed: AtomicBool,
    active: CancellationToken,
}

impl StandaloneCore {
    /// Create an unsealed core over the given storage views.
    pub fn new(
        physical: Arc<dyn PhysicalBackend>,
        barrier: Arc<dyn PhysicalBackend>,
        metrics: Arc<dyn MetricSink>,
    ) -> Self {
        Self {
            physical,
            barrier,
            metrics,
            sealed: AtomicBool::new(false),
            active: CancellationToken::new(),
        }
    }

    pub fn set_sealed(&self, sealed: bool) {
        self.sealed.store(sealed, Ordering::SeqCst);
    }

    /// Cancel the active context.
    pub fn shutdown(&self) {
        self.active.cancel();
    }
}

impl SealCore for StandaloneCore {
    fn physical(&self) -> Arc<dyn PhysicalBackend> {
        Arc::clone(&self.physical)
    }

    fn barrier(&self) -> Arc<dyn PhysicalBackend> {
        Arc::clone(&self.barrier)
    }

    fn sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    fn metric_sink(&self) -> Arc<dyn MetricSink> {
        Arc::clone(&self.metrics)
    }

    fn active_context(&self) -> CancellationToken {
        self.active.clone()
    }
}
