//! Parsing and validation of the GitHub provider records of a document.

use std::collections::BTreeMap;
use std::sync::Arc;

use gatehouse_config::{SiteConfig, ValidatorRegistry};

use super::canonical::{PROVIDER_KIND, canonicalize};
use crate::provider::{AuthProvider, DesiredProviderMap, OAuthProvider, ProviderDescriptor};
use crate::reconcile::{ParsedProviders, ProviderSource};

/// Build a provider instance from a validated GitHub descriptor.
#[must_use]
pub fn new_provider(descriptor: ProviderDescriptor) -> Arc<dyn AuthProvider> {
    Arc::new(OAuthProvider::new(descriptor))
}

/// Derive the desired GitHub provider set from a document.
///
/// Pure: no shared state is read or written, so it is safe to call
/// concurrently as a pre-acceptance check. Records of other provider types
/// are skipped. A malformed record yields a problem and never blocks its
/// siblings. Records that canonicalize to the same identity collide, and
/// the last one in document order wins.
#[must_use]
pub fn parse_config(config: &SiteConfig) -> ParsedProviders {
    let mut by_identity: BTreeMap<String, ProviderDescriptor> = BTreeMap::new();
    let mut problems = Vec::new();

    for record in config.github_providers() {
        match canonicalize(record) {
            Ok(descriptor) => {
                let identity = descriptor.config_id.id.clone();
                if let Some(previous) = by_identity.insert(identity, descriptor) {
                    tracing::debug!(
                        provider = %previous.config_id,
                        fingerprint = %previous.fingerprint(),
                        "GitHub provider record replaced by a later record with the same URL"
                    );
                }
            }
            Err(problem) => problems.push(problem),
        }
    }

    let providers: DesiredProviderMap = by_identity
        .into_values()
        .map(|descriptor| {
            let provider = new_provider(descriptor.clone());
            (descriptor, provider)
        })
        .collect();

    ParsedProviders {
        providers,
        problems,
    }
}

/// Pre-acceptance hook: the problems a document's GitHub records have.
///
/// An empty list means the document is acceptable.
#[must_use]
pub fn validate(config: &SiteConfig) -> Vec<String> {
    let mut problems = Vec::new();
    for record in config.github_providers() {
        if let Err(problem) = canonicalize(record) {
            problems.push(problem);
        }
    }
    problems
}

/// Register [`validate`] with a configuration validator registry.
pub fn contribute_validator(registry: &ValidatorRegistry) {
    registry.contribute("auth.github", validate);
}

/// [`ProviderSource`] for GitHub OAuth providers.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitHubProviders;

impl ProviderSource for GitHubProviders {
    fn kind(&self) -> &'static str {
        PROVIDER_KIND
    }

    fn parse(&self, config: &SiteConfig) -> ParsedProviders {
        parse_config(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_config::{AuthProviderConfig, BuiltinAuthProvider, GitHubAuthProvider};

    fn github(url: &str, secret: &str) -> AuthProviderConfig {
        AuthProviderConfig::Github(GitHubAuthProvider::new(url, "client", secret))
    }

    #[test]
    fn test_partial_failure() {
        let config = SiteConfig::new()
            .with_provider(github("not a url", "s"))
            .with_provider(github("https://ghe.example.com", "s"));

        let parsed = parse_config(&config);
        assert_eq!(parsed.problems.len(), 1);
        assert!(parsed.problems[0].contains("not a url"));
        assert_eq!(parsed.providers.len(), 1);

        let (descriptor, provider) = parsed.providers.iter().next().unwrap();
        assert_eq!(descriptor.base_url, "https://ghe.example.com");
        assert_eq!(provider.descriptor(), descriptor);
    }

    #[test]
    fn test_other_provider_types_are_skipped() {
        let config = SiteConfig::new()
            .with_provider(AuthProviderConfig::Builtin(BuiltinAuthProvider::default()))
            .with_provider(AuthProviderConfig::Other);

        let parsed = parse_config(&config);
        assert!(parsed.providers.is_empty());
        assert!(parsed.problems.is_empty());
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn test_identity_collision_last_wins() {
        let config = SiteConfig::new()
            .with_provider(github("https://github.com/", "first"))
            .with_provider(github("", "second"));

        let parsed = parse_config(&config);
        assert!(parsed.problems.is_empty());
        assert_eq!(parsed.providers.len(), 1);
        let descriptor = parsed.providers.keys().next().unwrap();
        assert_eq!(descriptor.client_secret.expose(), "second");
    }

    #[test]
    fn test_problems_keep_document_order() {
        let config = SiteConfig::new()
            .with_provider(github("bad one", "s"))
            .with_provider(github("https://ok.example.com", "s"))
            .with_provider(github("bad two", "s"));

        let problems = validate(&config);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("bad one"));
        assert!(problems[1].contains("bad two"));
        assert_eq!(parse_config(&config).problems, problems);
    }

    #[test]
    fn test_parse_is_repeatable() {
        let config = SiteConfig::new().with_provider(github("", "s"));
        let first = parse_config(&config);
        let second = parse_config(&config);
        assert!(first.providers.keys().eq(second.providers.keys()));
    }

    #[test]
    fn test_contribute_validator() {
        let registry = ValidatorRegistry::new();
        contribute_validator(&registry);
        assert_eq!(registry.names(), vec!["auth.github"]);

        let bad = SiteConfig::new().with_provider(github("not a url", "s"));
        assert_eq!(registry.validate(&bad).len(), 1);
        assert!(registry.validate(&SiteConfig::new()).is_empty());
    }

    #[test]
    fn test_provider_source() {
        let source = GitHubProviders;
        assert_eq!(source.kind(), "github");
        let parsed = source.parse(&SiteConfig::new().with_provider(github("", "s")));
        assert_eq!(parsed.providers.len(), 1);
    }
}
