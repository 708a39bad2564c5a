//! Background reconciliation on configuration changes.
//!
//! [`ReconcileService`] owns the watch subscription. It reconciles the
//! current document once at start, then once per change notification.
//! Notifications carry no payload: every pass re-reads the full current
//! document, so notifications that pile up while a pass runs are coalesced
//! into a single follow-up pass.
//!
//! # Example
//!
//! ```ignore
//! use gatehouse_auth::reload::{ReconcileService, ReloadConfig};
//! use std::sync::Arc;
//!
//! let service = Arc::new(ReconcileService::new(
//!     reconciler,
//!     config_manager.clone(),
//!     ReloadConfig::default(),
//! ));
//!
//! let handle = tokio::spawn({
//!     let service = service.clone();
//!     async move { service.run().await }
//! });
//!
//! // later
//! service.shutdown();
//! handle.await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use gatehouse_config::{ConfigChangeEvent, ConfigWatcher};
use tokio::sync::{Notify, broadcast};
use tokio::time::Duration;

use crate::error::AuthResult;
use crate::reconcile::{ReconcileOutcome, Reconciler};

// =============================================================================
// Reload Configuration
// =============================================================================

/// Configuration for the reconciliation service.
#[derive(Debug, Clone)]
pub struct ReloadConfig {
    /// Debounce time in milliseconds.
    ///
    /// Notifications arriving within this window after the first one are
    /// folded into the same pass.
    pub debounce_ms: u64,

    /// Maximum number of attempts per pass.
    pub max_retry_attempts: usize,

    /// Initial retry backoff in milliseconds.
    ///
    /// Backoff doubles on each retry.
    pub retry_backoff_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            max_retry_attempts: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl ReloadConfig {
    /// Create a configuration for testing with fast timeouts.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            debounce_ms: 10,
            max_retry_attempts: 3,
            retry_backoff_ms: 10,
        }
    }
}

// =============================================================================
// Reload Statistics
// =============================================================================

/// Statistics about the reconciliation service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadStats {
    /// Total number of reconciliation attempts, retries included.
    pub passes_attempted: u64,
    /// Number of passes that applied successfully.
    pub passes_succeeded: u64,
    /// Number of passes that failed after all retries.
    pub passes_failed: u64,
    /// Number of change notifications received.
    pub notifications_received: u64,
    /// Number of notifications folded into another notification's pass.
    pub notifications_coalesced: u64,
}

// =============================================================================
// Reconcile Service
// =============================================================================

/// Long-lived task that keeps the provider registry in line with the
/// configuration watcher.
pub struct ReconcileService {
    reconciler: Arc<Reconciler>,
    watcher: Arc<dyn ConfigWatcher>,
    config: ReloadConfig,

    shutdown: AtomicBool,
    shutdown_signal: Notify,
    trigger: Notify,

    passes_attempted: AtomicU64,
    passes_succeeded: AtomicU64,
    passes_failed: AtomicU64,
    notifications_received: AtomicU64,
    notifications_coalesced: AtomicU64,
}

impl ReconcileService {
    #[must_use]
    pub fn new(
        reconciler: Arc<Reconciler>,
        watcher: Arc<dyn ConfigWatcher>,
        config: ReloadConfig,
    ) -> Self {
        Self {
            reconciler,
            watcher,
            config,
            shutdown: AtomicBool::new(false),
            shutdown_signal: Notify::new(),
            trigger: Notify::new(),
            passes_attempted: AtomicU64::new(0),
            passes_succeeded: AtomicU64::new(0),
            passes_failed: AtomicU64::new(0),
            notifications_received: AtomicU64::new(0),
            notifications_coalesced: AtomicU64::new(0),
        }
    }

    /// Run the service until [`shutdown`](Self::shutdown) is called or the
    /// watcher's channel closes.
    pub async fn run(&self) {
        // Subscribe before the initial pass so no change slips in between.
        let mut receiver = self.watcher.subscribe();
        let debounce = Duration::from_millis(self.config.debounce_ms);

        tracing::info!(
            kind = self.reconciler.kind(),
            debounce_ms = self.config.debounce_ms,
            "Auth provider reconciliation started"
        );
        self.perform_reconcile().await;

        loop {
            if self.is_shutting_down() {
                break;
            }

            tokio::select! {
                _ = self.shutdown_signal.notified() => break,

                _ = self.trigger.notified() => {
                    tracing::debug!("Manual reconciliation requested");
                }

                result = receiver.recv() => {
                    match result {
                        Ok(event) => {
                            tracing::debug!(
                                source = %event.source,
                                version = event.version,
                                "Configuration change received"
                            );
                            self.notifications_received.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "Missed configuration change notifications");
                            self.notifications_received.fetch_add(n, Ordering::Relaxed);
                            self.notifications_coalesced.fetch_add(n, Ordering::Relaxed);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Configuration change channel closed");
                            break;
                        }
                    }
                }
            }

            if !debounce.is_zero() {
                tokio::time::sleep(debounce).await;
            }
            self.drain_pending(&mut receiver);

            if self.is_shutting_down() {
                break;
            }
            self.perform_reconcile().await;
        }

        tracing::info!("Auth provider reconciliation stopped");
    }

    /// Fold every queued notification into the upcoming pass.
    fn drain_pending(&self, receiver: &mut broadcast::Receiver<ConfigChangeEvent>) {
        loop {
            match receiver.try_recv() {
                Ok(_) => {
                    self.notifications_received.fetch_add(1, Ordering::Relaxed);
                    self.notifications_coalesced.fetch_add(1, Ordering::Relaxed);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.notifications_received.fetch_add(n, Ordering::Relaxed);
                    self.notifications_coalesced.fetch_add(n, Ordering::Relaxed);
                }
                Err(_) => break,
            }
        }
    }

    async fn perform_reconcile(&self) {
        if let Err(e) = self.reconcile_with_retry().await {
            tracing::error!(error = %e, "Auth provider reconciliation failed after all retries");
        }
    }

    /// Reconcile the watcher's current document, retrying with exponential
    /// backoff.
    ///
    /// Each attempt re-reads the current document.
    pub async fn reconcile_with_retry(&self) -> AuthResult<ReconcileOutcome> {
        let mut attempts = 0;
        let mut backoff = self.config.retry_backoff_ms;

        loop {
            self.passes_attempted.fetch_add(1, Ordering::Relaxed);
            let document = self.watcher.current();

            match self.reconciler.reconcile(&document).await {
                Ok(outcome) => {
                    self.passes_succeeded.fetch_add(1, Ordering::Relaxed);
                    if !outcome.is_noop() || !outcome.problems.is_empty() {
                        tracing::info!(
                            enabled = outcome.enabled.len(),
                            disabled = outcome.disabled.len(),
                            problems = outcome.problems.len(),
                            "Auth providers reconciled"
                        );
                    }
                    return Ok(outcome);
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.config.max_retry_attempts {
                        self.passes_failed.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }

                    tracing::warn!(
                        attempt = attempts,
                        max_attempts = self.config.max_retry_attempts,
                        error = %e,
                        backoff_ms = backoff,
                        "Auth provider reconciliation failed, retrying"
                    );

                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }

    /// Request a pass without a configuration change.
    pub fn trigger_reconcile(&self) {
        self.trigger.notify_one();
    }

    /// Signal the service to stop after the current pass.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.shutdown_signal.notify_one();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> ReloadStats {
        ReloadStats {
            passes_attempted: self.passes_attempted.load(Ordering::Relaxed),
            passes_succeeded: self.passes_succeeded.load(Ordering::Relaxed),
            passes_failed: self.passes_failed.load(Ordering::Relaxed),
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            notifications_coalesced: self.notifications_coalesced.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }
}

// =============================================================================
// Tests
// =============================================================================
