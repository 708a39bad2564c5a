//! Provider reconciliation.
//!
//! A [`Reconciler`] owns the active snapshot: the desired provider map it
//! last applied successfully. Each pass parses a document into a new desired
//! map, diffs it against the snapshot and hands the difference to a
//! [`ProviderSink`] as one [`UpdateBatch`].
//!
//! # Example
//!
//! ```ignore
//! use gatehouse_auth::reconcile::Reconciler;
//! use gatehouse_auth::registry::ProviderRegistry;
//!
//! let registry = Arc::new(ProviderRegistry::new());
//! let reconciler = Reconciler::new(registry.clone());
//!
//! let outcome = reconciler.reconcile(&config).await?;
//! println!("enabled {}, disabled {}", outcome.enabled.len(), outcome.disabled.len());
//! ```

use std::sync::Arc;

use gatehouse_config::SiteConfig;
use tokio::sync::Mutex;

use crate::error::AuthResult;
use crate::github::GitHubProviders;
use crate::provider::{AuthProvider, DesiredProviderMap, ProviderConfigId, ProviderDescriptor};
use crate::registry::{ProviderSink, UpdateBatch};

// =============================================================================
// Provider Sources
// =============================================================================

/// Result of parsing a document for one provider type.
#[derive(Debug, Default)]
pub struct ParsedProviders {
    /// Successfully canonicalized providers.
    pub providers: DesiredProviderMap,
    /// Problems for records that were skipped, in document order.
    pub problems: Vec<String>,
}

/// Derives the desired provider set of one provider type from a document.
///
/// Implementations must be pure: reconciliation and pre-acceptance checks
/// call them concurrently.
pub trait ProviderSource: Send + Sync {
    /// Provider type handled by this source.
    fn kind(&self) -> &'static str;

    /// Parse a full document.
    fn parse(&self, config: &SiteConfig) -> ParsedProviders;
}

// =============================================================================
// Diff
// =============================================================================

/// Compute the batch that turns `active` into `desired`.
///
/// Keys present in both maps are left alone. Disables come first, then
/// enables, each in descriptor order.
#[must_use]
pub fn diff(active: &DesiredProviderMap, desired: &DesiredProviderMap) -> UpdateBatch {
    let mut batch = UpdateBatch::new();

    for (descriptor, provider) in active {
        if !desired.contains_key(descriptor) {
            batch.disable(Arc::clone(provider));
        }
    }

    for (descriptor, provider) in desired {
        if !active.contains_key(descriptor) {
            batch.enable(Arc::clone(provider));
        }
    }

    batch
}

// =============================================================================
// Reconciler
// =============================================================================

/// The provider map last applied to the sink.
///
/// Values are the instances the sink actually holds.
#[derive(Debug, Default)]
pub struct ActiveSnapshot {
    providers: DesiredProviderMap,
    passes: u64,
}

impl ActiveSnapshot {
    /// Applied descriptors in key order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// What a single pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Providers installed by this pass.
    pub enabled: Vec<ProviderConfigId>,
    /// Providers removed by this pass.
    pub disabled: Vec<ProviderConfigId>,
    /// Problems found in the document; the affected records were skipped.
    pub problems: Vec<String>,
}

impl ReconcileOutcome {
    /// Returns `true` if the pass submitted nothing to the sink.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty()
    }
}

/// Serializes reconciliation passes and owns the active snapshot.
pub struct Reconciler {
    source: Arc<dyn ProviderSource>,
    sink: Arc<dyn ProviderSink>,
    active: Mutex<ActiveSnapshot>,
}

impl Reconciler {
    /// Create a reconciler for GitHub providers.
    #[must_use]
    pub fn new(sink: Arc<dyn ProviderSink>) -> Self {
        Self::with_source(Arc::new(GitHubProviders), sink)
    }

    /// Create a reconciler for an arbitrary provider source.
    #[must_use]
    pub fn with_source(source: Arc<dyn ProviderSource>, sink: Arc<dyn ProviderSink>) -> Self {
        Self {
            source,
            sink,
            active: Mutex::new(ActiveSnapshot::default()),
        }
    }

    /// Run one reconciliation pass against `config`.
    ///
    /// Problems in individual records are reported in the outcome and do not
    /// fail the pass. A sink error is returned as is, and the active
    /// snapshot is left exactly as it was.
    pub async fn reconcile(&self, config: &SiteConfig) -> AuthResult<ReconcileOutcome> {
        let mut active = self.active.lock().await;
        let kind = self.source.kind();

        let ParsedProviders {
            providers: desired,
            problems,
        } = self.source.parse(config);

        for problem in &problems {
            tracing::warn!(kind, problem = %problem, "Skipping auth provider record");
        }

        let batch = diff(&active.providers, &desired);
        let outcome = ReconcileOutcome {
            enabled: batch.enabled().map(|p| p.config_id().clone()).collect(),
            disabled: batch.disabled().map(|p| p.config_id().clone()).collect(),
            problems,
        };

        if !batch.is_empty() {
            if let Err(e) = self.sink.apply_batch(&batch) {
                tracing::error!(
                    kind,
                    error = %e,
                    enabled = outcome.enabled.len(),
                    disabled = outcome.disabled.len(),
                    "Failed to apply auth provider batch"
                );
                return Err(e.into());
            }

            for update in batch.iter() {
                let descriptor = update.provider.descriptor();
                tracing::info!(
                    kind,
                    provider = %descriptor.config_id,
                    fingerprint = %descriptor.fingerprint(),
                    enabled = update.enable,
                    "Auth provider updated"
                );
            }
        }

        // Keys that survived the diff keep the instance already installed.
        let applied: DesiredProviderMap = desired
            .into_iter()
            .map(|(descriptor, provider)| {
                let provider = active
                    .providers
                    .get(&descriptor)
                    .map_or(provider, Arc::clone);
                (descriptor, provider)
            })
            .collect();
        active.providers = applied;
        active.passes += 1;

        tracing::debug!(
            kind,
            pass = active.passes,
            active = active.providers.len(),
            problems = outcome.problems.len(),
            "Reconciliation pass complete"
        );

        Ok(outcome)
    }

    /// Descriptors of the active snapshot.
    ///
    /// Waits for an in-flight pass to finish.
    pub async fn snapshot(&self) -> Vec<ProviderDescriptor> {
        self.active.lock().await.descriptors().cloned().collect()
    }

    /// Number of completed passes.
    pub async fn passes(&self) -> u64 {
        self.active.lock().await.passes
    }

    /// Provider type handled by this reconciler.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("kind", &self.source.kind())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::registry::{ProviderRegistry, RegistryError};
    use gatehouse_config::{AuthProviderConfig, GitHubAuthProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // -------------------------------------------------------------------------
    // Mock Sink
    // -------------------------------------------------------------------------

    /// Records batches and fails the first `fail_count` calls.
    #[derive(Default)]
    struct RecordingSink {
        registry: ProviderRegistry,
        batches: std::sync::Mutex<Vec<Vec<(ProviderConfigId, String, bool)>>>,
        calls: AtomicUsize,
        fail_count: AtomicUsize,
    }

    impl RecordingSink {
        fn set_fail_count(&self, count: usize) {
            self.fail_count.store(count, Ordering::SeqCst);
        }

        fn batches(&self) -> Vec<Vec<(ProviderConfigId, String, bool)>> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl ProviderSink for RecordingSink {
        fn apply_batch(&self, batch: &UpdateBatch) -> Result<(), RegistryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_count.load(Ordering::SeqCst) {
                return Err(RegistryError::Unavailable("simulated failure".to_string()));
            }

            self.registry.apply_batch(batch)?;
            self.batches.lock().unwrap().push(
                batch
                    .iter()
                    .map(|u| {
                        let d = u.provider.descriptor();
                        (
                            d.config_id.clone(),
                            d.client_secret.expose().to_string(),
                            u.enable,
                        )
                    })
                    .collect(),
            );
            Ok(())
        }
    }

    fn github(url: &str, secret: &str) -> AuthProviderConfig {
        AuthProviderConfig::Github(GitHubAuthProvider::new(url, "client", secret))
    }

    fn id(url: &str) -> ProviderConfigId {
        ProviderConfigId::new("github", url)
    }

    fn setup() -> (Arc<RecordingSink>, Reconciler) {
        let sink = Arc::new(RecordingSink::default());
        let reconciler = Reconciler::new(sink.clone());
        (sink, reconciler)
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_idempotence() {
        let (sink, reconciler) = setup();
        let config = SiteConfig::new().with_provider(github("https://a.example.com", "s"));

        let first = reconciler.reconcile(&config).await.unwrap();
        assert_eq!(first.enabled, vec![id("https://a.example.com")]);

        let second = reconciler.reconcile(&config).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(sink.batches().len(), 1);
        assert_eq!(reconciler.passes().await, 2);
    }

    #[tokio::test]
    async fn test_removal_and_readd_after_noop_pass() {
        let (sink, reconciler) = setup();
        let a = SiteConfig::new().with_provider(github("https://a.example.com", "s1"));

        reconciler.reconcile(&a).await.unwrap();
        let installed = sink.registry.get(&id("https://a.example.com")).unwrap().instance();
        assert!(reconciler.reconcile(&a).await.unwrap().is_noop());

        let removed = reconciler.reconcile(&SiteConfig::new()).await.unwrap();
        assert_eq!(removed.disabled, vec![id("https://a.example.com")]);
        assert!(sink.registry.is_empty());
        assert!(!sink.batches()[1][0].2);

        let readded = reconciler
            .reconcile(&SiteConfig::new().with_provider(github("https://a.example.com", "s2")))
            .await
            .unwrap();
        assert_eq!(readded.enabled, vec![id("https://a.example.com")]);
        let provider = sink.registry.get(&id("https://a.example.com")).unwrap();
        assert_ne!(provider.instance(), installed);
        assert_eq!(provider.descriptor().client_secret.expose(), "s2");
    }

    #[tokio::test]
    async fn test_rotation_after_noop_passes() {
        let (sink, reconciler) = setup();
        let a = SiteConfig::new().with_provider(github("https://a.example.com", "s1"));

        reconciler.reconcile(&a).await.unwrap();
        let installed = sink.registry.get(&id("https://a.example.com")).unwrap().instance();
        for _ in 0..3 {
            assert!(reconciler.reconcile(&a).await.unwrap().is_noop());
        }
        assert_eq!(
            sink.registry.get(&id("https://a.example.com")).unwrap().instance(),
            installed
        );

        let outcome = reconciler
            .reconcile(&SiteConfig::new().with_provider(github("https://a.example.com", "s2")))
            .await
            .unwrap();
        assert_eq!(outcome.disabled, vec![id("https://a.example.com")]);
        assert_eq!(outcome.enabled, vec![id("https://a.example.com")]);
        assert_eq!(sink.registry.len(), 1);
        assert_eq!(
            sink.registry
                .get(&id("https://a.example.com"))
                .unwrap()
                .descriptor()
                .client_secret
                .expose(),
            "s2"
        );
    }

    #[tokio::test]
    async fn test_addition_enables_only_new_provider() {
        let (sink, reconciler) = setup();
        let a = github("https://a.example.com", "s");
        let b = github("https://b.example.com", "s");

        reconciler
            .reconcile(&SiteConfig::new().with_provider(a.clone()))
            .await
            .unwrap();
        let outcome = reconciler
            .reconcile(&SiteConfig::new().with_provider(a).with_provider(b))
            .await
            .unwrap();

        assert_eq!(outcome.enabled, vec![id("https://b.example.com")]);
        assert!(outcome.disabled.is_empty());
        assert_eq!(
            sink.batches()[1],
            vec![(id("https://b.example.com"), "s".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_removal_disables_only_missing_provider() {
        let (sink, reconciler) = setup();
        let a = github("https://a.example.com", "s");
        let b = github("https://b.example.com", "s");

        reconciler
            .reconcile(&SiteConfig::new().with_provider(a.clone()).with_provider(b))
            .await
            .unwrap();
        let outcome = reconciler
            .reconcile(&SiteConfig::new().with_provider(a))
            .await
            .unwrap();

        assert_eq!(outcome.disabled, vec![id("https://b.example.com")]);
        assert!(outcome.enabled.is_empty());
        assert_eq!(sink.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_secret_change_is_replace() {
        let (sink, reconciler) = setup();

        reconciler
            .reconcile(&SiteConfig::new().with_provider(github("https://a.example.com", "s1")))
            .await
            .unwrap();
        let outcome = reconciler
            .reconcile(&SiteConfig::new().with_provider(github("https://a.example.com", "s2")))
            .await
            .unwrap();

        assert_eq!(outcome.disabled, vec![id("https://a.example.com")]);
        assert_eq!(outcome.enabled, vec![id("https://a.example.com")]);
        assert_eq!(
            sink.batches()[1],
            vec![
                (id("https://a.example.com"), "s1".to_string(), false),
                (id("https://a.example.com"), "s2".to_string(), true),
            ]
        );

        let installed = sink.registry.get(&id("https://a.example.com")).unwrap();
        assert_eq!(installed.descriptor().client_secret.expose(), "s2");
    }

    #[tokio::test]
    async fn test_equivalent_urls_do_not_churn() {
        let (sink, reconciler) = setup();

        reconciler
            .reconcile(&SiteConfig::new().with_provider(github("https://github.com", "s")))
            .await
            .unwrap();
        let outcome = reconciler
            .reconcile(&SiteConfig::new().with_provider(github("", "s")))
            .await
            .unwrap();

        assert!(outcome.is_noop());
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_problems_do_not_abort_pass() {
        let (sink, reconciler) = setup();
        let config = SiteConfig::new()
            .with_provider(github("not a url", "s"))
            .with_provider(github("https://ok.example.com", "s"));

        let outcome = reconciler.reconcile(&config).await.unwrap();
        assert_eq!(outcome.problems.len(), 1);
        assert_eq!(outcome.enabled, vec![id("https://ok.example.com")]);
        assert_eq!(sink.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_snapshot() {
        let (sink, reconciler) = setup();
        let a = github("https://a.example.com", "s");

        reconciler
            .reconcile(&SiteConfig::new().with_provider(a.clone()))
            .await
            .unwrap();
        let before = reconciler.snapshot().await;

        sink.set_fail_count(usize::MAX);
        let changed = SiteConfig::new()
            .with_provider(a)
            .with_provider(github("https://b.example.com", "s"));
        let err = reconciler.reconcile(&changed).await.unwrap_err();
        assert!(matches!(err, AuthError::Registry(RegistryError::Unavailable(_))));
        assert_eq!(reconciler.snapshot().await, before);
        assert_eq!(sink.registry.len(), 1);

        // The next pass retries the same diff against the last good snapshot.
        sink.set_fail_count(0);
        let outcome = reconciler.reconcile(&changed).await.unwrap();
        assert_eq!(outcome.enabled, vec![id("https://b.example.com")]);
        assert_eq!(sink.registry.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_submitted() {
        let (sink, reconciler) = setup();
        let outcome = reconciler.reconcile(&SiteConfig::new()).await.unwrap();
        assert!(outcome.is_noop());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_passes_are_serialized() {
        let registry = Arc::new(ProviderRegistry::new());
        let reconciler = Arc::new(Reconciler::new(registry.clone()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let reconciler = reconciler.clone();
            handles.push(tokio::spawn(async move {
                let config = SiteConfig::new()
                    .with_provider(github(&format!("https://host{}.example.com", i % 2), "s"));
                reconciler.reconcile(&config).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = reconciler.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.providers()[0].config_id(),
            &snapshot[0].config_id
        );
    }

    #[test]
    fn test_diff_orders_disables_before_enables() {
        let parse = |config: &SiteConfig| GitHubProviders.parse(config).providers;
        let active = parse(
            &SiteConfig::new()
                .with_provider(github("https://a.example.com", "s"))
                .with_provider(github("https://b.example.com", "s")),
        );
        let desired = parse(
            &SiteConfig::new()
                .with_provider(github("https://b.example.com", "s"))
                .with_provider(github("https://c.example.com", "s")),
        );

        let batch = diff(&active, &desired);
        let entries: Vec<_> = batch
            .iter()
            .map(|u| (u.provider.config_id().id.clone(), u.enable))
            .collect();
        assert_eq!(
            entries,
            vec![
                ("https://a.example.com".to_string(), false),
                ("https://c.example.com".to_string(), true),
            ]
        );
    }
}
