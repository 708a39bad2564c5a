//! Configuration change events and event bus types

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Source of a configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Configuration loaded from file
    File,
    /// Configuration proposed via API
    Api,
    /// Initial document at startup
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Api => write!(f, "api"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Operation type for configuration changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOperation {
    /// A new document was accepted
    Update,
    /// The document was re-read from its source
    Reload,
}

impl std::fmt::Display for ConfigOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::Reload => write!(f, "reload"),
        }
    }
}

/// Event representing a configuration change.
///
/// Carries no payload: receivers re-read the full current document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChangeEvent {
    /// Source of the change
    pub source: ConfigSource,
    /// Operation type
    pub operation: ConfigOperation,
    /// Version of the accepted document (0 when not yet accepted)
    pub version: u64,
    /// Timestamp of the change
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ConfigChangeEvent {
    /// Create a new configuration change event
    pub fn new(source: ConfigSource, operation: ConfigOperation) -> Self {
        Self {
            source,
            operation,
            version: 0,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Attach the accepted document version
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Create a reload event from file
    pub fn file_reload() -> Self {
        Self::new(ConfigSource::File, ConfigOperation::Reload)
    }
}
