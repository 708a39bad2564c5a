//! GitHub and GitHub Enterprise OAuth providers.
//!
//! - [`canonical`] - Record canonicalization and endpoint derivation
//! - [`config`] - Document parsing, pre-acceptance validation, provider source

pub mod canonical;
pub mod config;

pub use canonical::{
    DEFAULT_DISPLAY_NAME, DEFAULT_GITHUB_URL, GITHUB_SCOPES, PROVIDER_KIND, canonicalize,
    normalize_base_url,
};
pub use config::{GitHubProviders, contribute_validator, new_provider, parse_config, validate};
