//! Configuration Manager
//!
//! Holds the live site configuration document, gates every new document
//! through the contributed validators, and broadcasts accepted changes.

use crate::ConfigError;
use crate::document::SiteConfig;
use crate::events::{ConfigChangeEvent, ConfigOperation, ConfigSource as EventSource};
use crate::sources::{ConfigSource, FileSource, FileWatcherConfig, WatchHandle};
use crate::validation::ValidatorRegistry;

use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Read side of the configuration distribution mechanism.
///
/// Change notifications carry no document; subscribers re-read
/// [`ConfigWatcher::current`] after every event.
pub trait ConfigWatcher: Send + Sync {
    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent>;

    /// The current live document.
    fn current(&self) -> Arc<SiteConfig>;
}

/// Configuration manager builder
pub struct ConfigurationManagerBuilder {
    file: Option<FileWatcherConfig>,
    document: Option<SiteConfig>,
    validators: Option<ValidatorRegistry>,
    event_capacity: usize,
}

impl ConfigurationManagerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            file: None,
            document: None,
            validators: None,
            event_capacity: 64,
        }
    }

    /// Set the configuration file path
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(FileWatcherConfig::new(path));
        self
    }

    /// Set the configuration file with custom watcher settings
    pub fn with_file_watcher(mut self, config: FileWatcherConfig) -> Self {
        self.file = Some(config);
        self
    }

    /// Start from an in-memory document instead of (or before) the file
    pub fn with_document(mut self, document: SiteConfig) -> Self {
        self.document = Some(document);
        self
    }

    /// Share a validator registry with the manager
    pub fn with_validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = Some(validators);
        self
    }

    /// Capacity of the change event channel
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Build the configuration manager.
    ///
    /// The initial document is not gated: a partially bad file still starts,
    /// and its bad entries are reported by whoever consumes it.
    pub async fn build(self) -> Result<ConfigurationManager, ConfigError> {
        let source: Option<Arc<dyn ConfigSource>> = self
            .file
            .map(|config| Arc::new(FileSource::new(config)) as Arc<dyn ConfigSource>);

        let initial = match (&source, self.document) {
            (_, Some(document)) => document,
            (Some(source), None) => source.load().await?,
            (None, None) => SiteConfig::default(),
        };

        let (event_tx, _) = broadcast::channel(self.event_capacity);

        Ok(ConfigurationManager {
            source,
            current: ArcSwap::from_pointee(initial),
            version: AtomicU64::new(1),
            validators: self.validators.unwrap_or_default(),
            event_bus: event_tx,
            accept_lock: Mutex::new(()),
            watch_handles: Mutex::new(Vec::new()),
        })
    }
}

impl Default for ConfigurationManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Central configuration manager
pub struct ConfigurationManager {
    /// File source (if configured)
    source: Option<Arc<dyn ConfigSource>>,
    /// Live document
    current: ArcSwap<SiteConfig>,
    /// Version of the live document
    version: AtomicU64,
    /// Pre-acceptance gate
    validators: ValidatorRegistry,
    /// Event bus for broadcasting changes
    event_bus: broadcast::Sender<ConfigChangeEvent>,
    /// Serializes document acceptance so versions and events stay ordered
    accept_lock: Mutex<()>,
    /// Watch handles
    watch_handles: Mutex<Vec<WatchHandle>>,
}

impl ConfigurationManager {
    /// Create a new builder
    pub fn builder() -> ConfigurationManagerBuilder {
        ConfigurationManagerBuilder::new()
    }

    /// Get the current live document
    pub fn config(&self) -> Arc<SiteConfig> {
        self.current.load_full()
    }

    /// Version of the live document (starts at 1)
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// The validator registry used as the pre-acceptance gate
    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }

    /// Run the pre-acceptance gate without touching the live document
    pub fn validate(&self, config: &SiteConfig) -> Vec<String> {
        self.validators.validate(config)
    }

    /// Subscribe to configuration changes
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.event_bus.subscribe()
    }

    /// Propose a new document via the API.
    ///
    /// Returns the new version, or [`ConfigError::Rejected`] with the
    /// problems when any validator objects.
    pub async fn propose(&self, config: SiteConfig) -> Result<u64, ConfigError> {
        self.accept(config, EventSource::Api, ConfigOperation::Update)
            .await
    }

    /// Reload the document from the file source and propose it
    pub async fn reload(&self) -> Result<u64, ConfigError> {
        let Some(source) = &self.source else {
            return Err(ConfigError::source_error("no file source configured"));
        };

        let config = source.load().await?;
        self.accept(config, EventSource::File, ConfigOperation::Reload)
            .await
    }

    async fn accept(
        &self,
        config: SiteConfig,
        source: EventSource,
        operation: ConfigOperation,
    ) -> Result<u64, ConfigError> {
        let problems = self.validators.validate(&config);
        if !problems.is_empty() {
            return Err(ConfigError::Rejected { problems });
        }

        let version = {
            let _guard = self.accept_lock.lock().await;
            self.current.store(Arc::new(config));
            let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;

            let event = ConfigChangeEvent::new(source, operation).with_version(version);
            if self.event_bus.send(event).is_err() {
                debug!("No subscribers for config change event");
            }
            version
        };

        info!(version, source = %source, "Configuration accepted");
        Ok(version)
    }

    /// Start watching the file source for changes.
    ///
    /// Every file event triggers [`ConfigurationManager::reload`]. A rejected
    /// or unreadable file is logged and the previous document stays live.
    pub async fn start_watching(self: &Arc<Self>) -> Result<(), ConfigError> {
        let Some(source) = self.source.clone() else {
            debug!("No file source configured; nothing to watch");
            return Ok(());
        };

        let (tx, mut rx) = mpsc::channel::<ConfigChangeEvent>(16);
        let handle = source.watch(tx).await?;
        self.watch_handles.lock().await.push(handle);
        info!("Started watching {} source", source.name());

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                debug!(?event, "Received config change event");

                match manager.reload().await {
                    Ok(_) => {}
                    Err(ConfigError::Rejected { problems }) => {
                        for problem in &problems {
                            warn!(problem = %problem, "Rejected configuration change");
                        }
                        warn!(
                            count = problems.len(),
                            "Configuration file rejected; keeping previous configuration"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "Configuration reload failed; keeping previous configuration");
                    }
                }
            }
            debug!("Config change processing task finished");
        });

        Ok(())
    }

    /// Stop all watchers
    pub async fn stop_watching(&self) {
        let mut handles = self.watch_handles.lock().await;
        for handle in handles.drain(..) {
            handle.stop().await;
        }
    }

    /// Wait until the version moves past `version`, or the timeout elapses.
    ///
    /// Returns the observed version.
    pub async fn wait_for_version_after(&self, version: u64, timeout: Duration) -> u64 {
        let mut rx = self.subscribe();
        let current = self.version();
        if current > version {
            return current;
        }

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(event) if event.version > version => return event.version,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        if self.version() > version {
                            return self.version();
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return self.version(),
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or_else(|_| self.version())
    }
}

impl ConfigWatcher for ConfigurationManager {
    fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        ConfigurationManager::subscribe(self)
    }

    fn current(&self) -> Arc<SiteConfig> {
        self.config()
    }
}

impl std::fmt::Debug for ConfigurationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationManager")
            .field("has_source", &self.source.is_some())
            .field("version", &self.version())
            .field("validators", &self.validators)
            .finish()
    }
}
