// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Seal Health Check
//!
//! A background loop that periodically round-trips a heartbeat value through
//! every configured seal backend.
//!
//! ## Design
//!
//! - Each pass checks all backends concurrently; a check is an encrypt of
//!   `"Heartbeat <uuid>"` followed by a decrypt that must return the same
//!   bytes. Each call has its own timeout.
//! - A backend's health mutex is held for the whole check, so two passes can
//!   never check the same backend at once.
//! - The pass publishes `seal.unreachable.time{seal_name}`: 0 when healthy,
//!   otherwise milliseconds since the backend was last seen healthy.
//! - The aggregate flag is the AND of every backend flag. While it is false
//!   the loop ticks at the shorter unhealthy interval.
//! - Passes start at a fixed rate; a slow pass does not push later ones back.
//!
//! Cancelling the stop token ends the loop, dropping any in-flight pass.
//! Cancelling the server's active context aborts in-flight backend calls but
//! leaves the loop running.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::access::{SealAccess, SealBackendInfo};
use crate::config::HealthCheckConfig;
use crate::core::SealCore;
use crate::error::SealError;
use crate::metrics::{Label, MetricSink, SEAL_UNREACHABLE_TIME};

/// Why a single backend round trip failed.
#[derive(Debug, thiserror::Error)]
enum RoundTripError {
    #[error("failed to encrypt heartbeat: {0}")]
    Encrypt(#[source] SealError),

    #[error("failed to decrypt heartbeat: {0}")]
    Decrypt(#[source] SealError),

    #[error("seal backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("decrypted heartbeat does not match")]
    Mismatch,

    #[error("server context cancelled")]
    Cancelled,
}

/// Aggregate health shared between the monitor and its owner.
#[derive(Debug)]
pub struct HealthState {
    all_healthy: RwLock<bool>,
    interval: RwLock<Duration>,
}

impl HealthState {
    /// Healthy, waiting `interval` before the first pass.
    pub fn new(interval: Duration) -> Self {
        Self {
            all_healthy: RwLock::new(true),
            interval: RwLock::new(interval),
        }
    }

    pub fn is_healthy(&self) -> bool {
        *self.all_healthy.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay before the next pass.
    pub fn interval(&self) -> Duration {
        *self.interval.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, all_healthy: bool, interval: Duration) {
        *self.all_healthy.write().unwrap_or_else(PoisonError::into_inner) = all_healthy;
        *self.interval.write().unwrap_or_else(PoisonError::into_inner) = interval;
    }
}

/// Fixed-rate ticker whose first tick is one `period` from now.
fn fixed_rate(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Checks every seal backend on a schedule.
pub struct HealthMonitor {
    access: Arc<dyn SealAccess>,
    config: HealthCheckConfig,
    state: Arc<HealthState>,
}

impl HealthMonitor {
    pub fn new(access: Arc<dyn SealAccess>, config: HealthCheckConfig, state: Arc<HealthState>) -> Self {
        Self {
            access,
            config,
            state,
        }
    }

    /// Run passes until `stop` is cancelled.
    pub async fn run(self, stop: CancellationToken, core: Arc<dyn SealCore>) {
        let active = core.active_context();
        let metrics = core.metric_sink();
        info!(
            nominal_secs = self.config.nominal_interval.as_secs(),
            unhealthy_secs = self.config.unhealthy_interval.as_secs(),
            "seal health check started"
        );

        let mut period = self.state.interval();
        let mut ticker = fixed_rate(period);
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = self.check(&active, metrics.as_ref()) => {}
            }

            // switching between nominal and unhealthy restarts the ticker
            let next = self.state.interval();
            if next != period {
                period = next;
                ticker = fixed_rate(period);
            }
        }

        info!("seal health check stopped");
    }

    /// Check every backend once and update the aggregate state. Returns the
    /// new aggregate flag.
    pub async fn check(&self, active: &CancellationToken, metrics: &dyn MetricSink) -> bool {
        let backends = self.access.all_seal_info_by_priority();
        let results = join_all(
            backends
                .iter()
                .map(|backend| self.check_backend(backend, active, metrics)),
        )
        .await;

        let all_healthy = results.into_iter().all(|healthy| healthy);
        let interval = if all_healthy {
            self.config.nominal_interval
        } else {
            self.config.unhealthy_interval
        };
        self.state.record(all_healthy, interval);
        debug!(all_healthy, next_check_secs = interval.as_secs(), "seal health check pass done");
        all_healthy
    }

    async fn check_backend(
        &self,
        backend: &SealBackendInfo,
        active: &CancellationToken,
        metrics: &dyn MetricSink,
    ) -> bool {
        let mut health = backend.lock_health().await;
        let labels = [Label::new("seal_name", backend.name())];
        let result = self.round_trip(backend, active).await;
        let now = Utc::now();
        health.last_health_check = Some(now);

        match result {
            Ok(()) => {
                if !health.healthy {
                    let downtime = now - health.last_seen_healthy;
                    info!(
                        seal_name = %backend.name(),
                        downtime_ms = downtime.num_milliseconds(),
                        "seal backend is healthy again"
                    );
                }
                debug!(seal_name = %backend.name(), "seal backend passed health check");
                health.healthy = true;
                health.last_seen_healthy = now;
                metrics.set_gauge_with_labels(SEAL_UNREACHABLE_TIME, 0.0, &labels);
                true
            }
            Err(e) => {
                health.healthy = false;
                let unreachable_ms = (now - health.last_seen_healthy).num_milliseconds().max(0);
                warn!(
                    seal_name = %backend.name(),
                    error = %e,
                    unreachable_ms,
                    "seal backend failed health check"
                );
                metrics.set_gauge_with_labels(SEAL_UNREACHABLE_TIME, unreachable_ms as f32, &labels);
                false
            }
        }
    }

    async fn round_trip(&self, backend: &SealBackendInfo, active: &CancellationToken) -> Result<(), RoundTripError> {
        let payload = format!("Heartbeat {}", Uuid::new_v4());

        let blob = self
            .bounded(active, backend.encrypt(payload.as_bytes(), None))
            .await?
            .map_err(RoundTripError::Encrypt)?;
        let plaintext = self
            .bounded(active, backend.decrypt(&blob, None))
            .await?
            .map_err(RoundTripError::Decrypt)?;

        if plaintext != payload.as_bytes() {
            return Err(RoundTripError::Mismatch);
        }
        Ok(())
    }

    /// Run one backend call under the check timeout and the active context.
    async fn bounded<T>(
        &self,
        active: &CancellationToken,
        call: impl Future<Output = T>,
    ) -> Result<T, RoundTripError> {
        tokio::select! {
            biased;
            _ = active.cancelled() => Err(RoundTripError::Cancelled),
            result = tokio::time::timeout(self.config.timeout, call) => {
                result.map_err(|_| RoundTripError::Timeout(self.config.timeout))
            }
        }
    }
}
