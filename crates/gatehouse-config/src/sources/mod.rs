//! Configuration sources
//!
//! A source can load the current document and watch for changes. Only the
//! file source ships today; API updates go through the manager directly.

mod file;

pub use file::{FileSource, FileWatcherConfig};

use crate::ConfigError;
use crate::document::SiteConfig;
use crate::events::ConfigChangeEvent;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for configuration sources
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Name of this source (for logging and debugging)
    fn name(&self) -> &str;

    /// Load the current document from this source
    async fn load(&self) -> Result<SiteConfig, ConfigError>;

    /// Start watching for changes
    ///
    /// The source should send events through the provided channel when
    /// configuration changes are detected.
    async fn watch(&self, tx: mpsc::Sender<ConfigChangeEvent>) -> Result<WatchHandle, ConfigError>;
}

/// Handle for a running watcher
pub struct WatchHandle {
    /// Task handle for the watcher
    handle: tokio::task::JoinHandle<()>,
    /// Shutdown signal
    shutdown: tokio::sync::oneshot::Sender<()>,
}

impl WatchHandle {
    /// Create a new watch handle
    pub fn new(
        handle: tokio::task::JoinHandle<()>,
        shutdown: tokio::sync::oneshot::Sender<()>,
    ) -> Self {
        Self { handle, shutdown }
    }

    /// Stop the watcher
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}
