//! Pre-acceptance validation of configuration documents.
//!
//! Subsystems contribute pure validators. A document is accepted only when
//! every contributed validator returns no problems, so bad configuration is
//! rejected before it ever becomes live.

use std::sync::{Arc, RwLock};

use crate::document::SiteConfig;

/// A pure validator: document in, human-readable problems out.
pub type Validator = Arc<dyn Fn(&SiteConfig) -> Vec<String> + Send + Sync>;

/// Registry of contributed validators.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: Arc<RwLock<Vec<(String, Validator)>>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contribute a named validator.
    pub fn contribute<F>(&self, name: impl Into<String>, validator: F)
    where
        F: Fn(&SiteConfig) -> Vec<String> + Send + Sync + 'static,
    {
        let mut validators = self
            .validators
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        validators.push((name.into(), Arc::new(validator)));
    }

    /// Run every validator, concatenating problems in contribution order.
    pub fn validate(&self, config: &SiteConfig) -> Vec<String> {
        // Clone out so validators never run under the lock.
        let validators: Vec<Validator> = self
            .validators
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, v)| Arc::clone(v))
            .collect();

        validators.iter().flat_map(|v| v(config)).collect()
    }

    /// Names of the contributed validators.
    pub fn names(&self) -> Vec<String> {
        self.validators
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.validators
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("validators", &self.names())
            .finish()
    }
}
