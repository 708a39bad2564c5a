//! Auth provider error types.
//!
//! Per-record configuration problems are not errors: they are collected as
//! strings by the validators. Errors here abort a single reconciliation pass.

use crate::registry::RegistryError;

/// Errors that can occur while reconciling auth providers.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The provider registry refused or failed to apply a batch.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Result type for reconciliation operations.
pub type AuthResult<T> = Result<T, AuthError>;
