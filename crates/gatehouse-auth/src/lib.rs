//! # gatehouse-auth
//!
//! Hot-reloadable OAuth provider integrations for gatehouse.
//!
//! This crate provides:
//! - Canonicalization and validation of GitHub provider records
//! - OAuth provider instances built from validated descriptors
//! - An in-memory provider registry with atomic batch updates
//! - A reconciler that diffs the desired provider set against the active one
//! - A background service that reconciles on every configuration change
//!
//! ## Overview
//!
//! ```text
//! ConfigWatcher ──event──▶ ReconcileService ──▶ Reconciler
//!                                                  │ parse (github::parse_config)
//!                                                  │ diff  (active snapshot vs desired)
//!                                                  ▼
//!                                           ProviderSink::apply_batch
//! ```
//!
//! ## Modules
//!
//! - [`github`] - GitHub record canonicalization, parsing and validation
//! - [`provider`] - Provider descriptors, the provider trait and the OAuth provider
//! - [`registry`] - Provider registry and update batches
//! - [`reconcile`] - Diff and reconciliation passes
//! - [`reload`] - Background reconciliation service

pub mod error;
pub mod github;
pub mod provider;
pub mod reconcile;
pub mod registry;
pub mod reload;

pub use error::{AuthError, AuthResult};
pub use github::{GitHubProviders, contribute_validator, parse_config, validate};
pub use provider::{
    AuthProvider, DesiredProviderMap, OAuthEndpoints, OAuthProvider, ProviderConfigId,
    ProviderDescriptor, ProviderInfo,
};
pub use reconcile::{
    ActiveSnapshot, ParsedProviders, ProviderSource, ReconcileOutcome, Reconciler, diff,
};
pub use registry::{
    ProviderRegistry, ProviderSet, ProviderSink, ProviderUpdate, RegistryError, UpdateBatch,
};
pub use reload::{ReconcileService, ReloadConfig, ReloadStats};
