//! Hot-reloadable site configuration for gatehouse
//!
//! This crate provides the configuration side of the auth provider subsystem:
//! - Parses the site configuration document (TOML file or JSON)
//! - Watches the configuration file for changes
//! - Gates every new document through contributed validators before it goes live
//! - Broadcasts accepted changes via an event bus
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 ConfigurationManager                     │
//! │  ┌─────────────┐        ┌───────────────────┐           │
//! │  │ FileWatcher │        │ propose() (API)   │           │
//! │  └──────┬──────┘        └─────────┬─────────┘           │
//! │         └───────────┬─────────────┘                     │
//! │               ┌─────▼──────┐                            │
//! │               │ Validators │  (pre-acceptance gate)     │
//! │               └─────┬──────┘                            │
//! │                Event Bus                                │
//! └─────────────────────┬───────────────────────────────────┘
//!                       ▼
//!              Reconciliation service
//! ```

pub mod document;
pub mod events;
pub mod manager;
pub mod sources;
pub mod validation;

// Re-export main types
pub use document::{
    AuthConfig, AuthProviderConfig, BuiltinAuthProvider, ClientSecret, GitHubAuthProvider,
    LoggingConfig, SiteConfig,
};
pub use events::{ConfigChangeEvent, ConfigOperation, ConfigSource as ConfigSourceType};
pub use manager::{ConfigWatcher, ConfigurationManager, ConfigurationManagerBuilder};
pub use sources::{ConfigSource, FileSource, FileWatcherConfig, WatchHandle};
pub use validation::{Validator, ValidatorRegistry};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration rejected: {}", .problems.join("; "))]
    Rejected { problems: Vec<String> },

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Source error: {message}")]
    Source { message: String },
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }

    pub fn source_error(msg: impl Into<String>) -> Self {
        Self::Source {
            message: msg.into(),
        }
    }

    /// Problems carried by a rejection, if this is one
    pub fn problems(&self) -> Option<&[String]> {
        match self {
            Self::Rejected { problems } => Some(problems),
            _ => None,
        }
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display_joins_problems() {
        let err = ConfigError::Rejected {
            problems: vec!["one".to_string(), "two".to_string()],
        };
        assert_eq!(err.to_string(), "Configuration rejected: one; two");
        assert_eq!(err.problems().map(<[String]>::len), Some(2));
        assert!(ConfigError::parse("x").problems().is_none());
    }
}
