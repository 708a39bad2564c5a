//! Provider registry with atomic batch updates.
//!
//! The registry is the shared store of live provider instances. Request
//! handlers read it lock-free; the reconciler mutates it only through
//! [`ProviderSink::apply_batch`], and a batch becomes visible all at once.
//!
//! # Example
//!
//! ```ignore
//! use gatehouse_auth::registry::{ProviderRegistry, ProviderSink, UpdateBatch};
//!
//! let registry = ProviderRegistry::new();
//! let mut batch = UpdateBatch::new();
//! batch.enable(provider);
//! registry.apply_batch(&batch)?;
//!
//! for provider in registry.providers() {
//!     println!("{}", provider.info().display_name);
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::provider::{AuthProvider, ProviderConfigId, ProviderInfo};

// =============================================================================
// Errors
// =============================================================================

/// Errors returned when a batch cannot be applied. The registry is left
/// unchanged in every case.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A disable entry names an instance that is not installed.
    #[error("Provider is not installed: {0}")]
    UnknownProvider(ProviderConfigId),

    /// An enable entry would leave two instances with the same identity.
    #[error("Provider is already installed: {0}")]
    DuplicateProvider(ProviderConfigId),

    /// The registry is unavailable.
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Update Batch
// =============================================================================

/// One enable/disable instruction.
#[derive(Debug, Clone)]
pub struct ProviderUpdate {
    pub provider: Arc<dyn AuthProvider>,
    /// `true` installs the provider, `false` removes it.
    pub enable: bool,
}

/// An ordered group of instructions applied as a unit.
#[derive(Debug, Clone, Default)]
pub struct UpdateBatch {
    updates: Vec<ProviderUpdate>,
}

impl UpdateBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a provider for installation.
    pub fn enable(&mut self, provider: Arc<dyn AuthProvider>) {
        self.updates.push(ProviderUpdate {
            provider,
            enable: true,
        });
    }

    /// Mark a provider for removal.
    pub fn disable(&mut self, provider: Arc<dyn AuthProvider>) {
        self.updates.push(ProviderUpdate {
            provider,
            enable: false,
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// All instructions in order.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderUpdate> {
        self.updates.iter()
    }

    /// Providers marked for installation.
    pub fn enabled(&self) -> impl Iterator<Item = &Arc<dyn AuthProvider>> {
        self.updates
            .iter()
            .filter(|u| u.enable)
            .map(|u| &u.provider)
    }

    /// Providers marked for removal.
    pub fn disabled(&self) -> impl Iterator<Item = &Arc<dyn AuthProvider>> {
        self.updates
            .iter()
            .filter(|u| !u.enable)
            .map(|u| &u.provider)
    }
}

// =============================================================================
// Provider Sink
// =============================================================================

/// Receiver of reconciliation batches.
pub trait ProviderSink: Send + Sync {
    /// Apply every instruction of the batch, or none of them.
    fn apply_batch(&self, batch: &UpdateBatch) -> Result<(), RegistryError>;
}

// =============================================================================
// Provider Registry
// =============================================================================

/// Immutable snapshot of the installed providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderSet {
    providers: BTreeMap<ProviderConfigId, Arc<dyn AuthProvider>>,
    generation: u64,
}

impl ProviderSet {
    /// Number of batches applied to reach this snapshot.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn get(&self, id: &ProviderConfigId) -> Option<&Arc<dyn AuthProvider>> {
        self.providers.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Installed providers ordered by identity.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AuthProvider>> {
        self.providers.values()
    }
}

/// In-memory provider registry.
///
/// Holds the installed set behind an `ArcSwap` (lock-free reads). Writers
/// are serialized and build the next set off to the side before swapping
/// it in, so readers see either the whole batch or none of it.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    current: ArcSwap<ProviderSet>,
    write_lock: Mutex<()>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the installed providers.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ProviderSet> {
        self.current.load_full()
    }

    /// Installed providers ordered by identity.
    #[must_use]
    pub fn providers(&self) -> Vec<Arc<dyn AuthProvider>> {
        self.current.load().iter().cloned().collect()
    }

    /// Secret-free summaries of the installed providers.
    #[must_use]
    pub fn infos(&self) -> Vec<ProviderInfo> {
        self.current.load().iter().map(|p| p.info()).collect()
    }

    /// Look up an installed provider.
    #[must_use]
    pub fn get(&self, id: &ProviderConfigId) -> Option<Arc<dyn AuthProvider>> {
        self.current.load().get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Build the set that results from applying `batch` to `current`.
    ///
    /// Removals are applied before installs so a batch may replace an
    /// identity's instance.
    fn next_set(current: &ProviderSet, batch: &UpdateBatch) -> Result<ProviderSet, RegistryError> {
        let mut providers = current.providers.clone();

        for provider in batch.disabled() {
            let id = provider.config_id();
            match providers.get(id) {
                Some(installed) if installed.instance() == provider.instance() => {
                    providers.remove(id);
                }
                _ => return Err(RegistryError::UnknownProvider(id.clone())),
            }
        }

        for provider in batch.enabled() {
            let id = provider.config_id();
            if providers.contains_key(id) {
                return Err(RegistryError::DuplicateProvider(id.clone()));
            }
            providers.insert(id.clone(), Arc::clone(provider));
        }

        Ok(ProviderSet {
            providers,
            generation: current.generation + 1,
        })
    }
}

impl ProviderSink for ProviderRegistry {
    fn apply_batch(&self, batch: &UpdateBatch) -> Result<(), RegistryError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| RegistryError::Unavailable("registry write lock poisoned".to_string()))?;

        let current = self.current.load_full();
        let next = Self::next_set(&current, batch)?;

        tracing::debug!(
            generation = next.generation,
            enabled = batch.enabled().count(),
            disabled = batch.disabled().count(),
            installed = next.len(),
            "Applied provider batch"
        );

        self.current.store(Arc::new(next));
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
