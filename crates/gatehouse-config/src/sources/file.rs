//! File-based configuration source
//!
//! Watches the configuration file for changes and signals a reload when it
//! is modified.

use crate::ConfigError;
use crate::document::SiteConfig;
use crate::events::ConfigChangeEvent;
use crate::sources::{ConfigSource, WatchHandle};

use async_trait::async_trait;
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Configuration for file watcher
#[derive(Debug, Clone)]
pub struct FileWatcherConfig {
    /// Path to the configuration file
    pub path: PathBuf,
    /// Debounce duration for rapid changes
    pub debounce: Duration,
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gatehouse.toml"),
            debounce: Duration::from_millis(500),
        }
    }
}

impl FileWatcherConfig {
    /// Create config for a specific path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set debounce duration
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// File-based configuration source
pub struct FileSource {
    config: FileWatcherConfig,
}

impl FileSource {
    /// Create a new file source
    pub fn new(config: FileWatcherConfig) -> Self {
        Self { config }
    }

    /// Create with default config for given path
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(FileWatcherConfig::new(path))
    }

    /// Path of the watched file
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Read and parse the configuration file
    fn read_config(&self) -> Result<SiteConfig, ConfigError> {
        let path = &self.config.path;

        if !path.exists() {
            debug!("Config file does not exist: {:?}", path);
            return Ok(SiteConfig::new());
        }

        let content = std::fs::read_to_string(path)?;

        SiteConfig::from_toml(&content)
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self) -> Result<SiteConfig, ConfigError> {
        self.read_config()
    }

    async fn watch(&self, tx: mpsc::Sender<ConfigChangeEvent>) -> Result<WatchHandle, ConfigError> {
        let path = self.config.path.clone();
        let debounce = self.config.debounce;

        // Watch the parent directory so editors that replace the file are seen
        let watch_path = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<DebounceEventResult>();
        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            let _ = notify_tx.send(result);
        })
        .map_err(|e| ConfigError::watcher(format!("Failed to create file watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(&watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::watcher(format!("Failed to watch {watch_path:?}: {e}")))?;

        info!("Started watching config file: {:?}", path);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            // Dropping the debouncer stops the OS watcher
            let _debouncer = debouncer;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("File watcher shutting down");
                        break;
                    }
                    result = notify_rx.recv() => {
                        let Some(result) = result else {
                            warn!("File watcher event channel closed");
                            break;
                        };

                        match result {
                            Ok(events) => {
                                // One reload per debounced batch is enough
                                let touched = events
                                    .iter()
                                    .any(|event| event.path.file_name() == path.file_name());
                                if !touched {
                                    continue;
                                }

                                info!("Config file changed: {:?}", path);
                                if tx.send(ConfigChangeEvent::file_reload()).await.is_err() {
                                    warn!("Config change receiver dropped");
                                    return;
                                }
                            }
                            Err(e) => {
                                error!("File watcher error: {:?}", e);
                            }
                        }
                    }
                }
            }
        });

        Ok(WatchHandle::new(handle, shutdown_tx))
    }
}
