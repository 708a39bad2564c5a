//! Auth provider descriptors and instances.
//!
//! A [`ProviderDescriptor`] is the validated, normalized form of one provider
//! record. It is the value key of the desired provider map: any change to a
//! provider's settings yields a different descriptor, so a change is always
//! modeled as "remove the old instance, add a new one".
//!
//! # Example
//!
//! ```ignore
//! use gatehouse_auth::provider::{OAuthProvider, ProviderDescriptor};
//!
//! let descriptor = gatehouse_auth::github::canonicalize(&record)?;
//! let provider = OAuthProvider::new(descriptor);
//! let url = provider.authorization_url("state-123", &redirect_uri);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gatehouse_config::ClientSecret;
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

/// Identity of a provider as seen by the registry: provider type plus
/// canonical identity (normalized base URL).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ProviderConfigId {
    /// Provider type, e.g. `github`.
    pub kind: String,
    /// Canonical identity within the type.
    pub id: String,
}

impl ProviderConfigId {
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ProviderConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// OAuth endpoints derived from a provider's base URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OAuthEndpoints {
    /// Where users are redirected to authorize.
    pub auth_url: Url,
    /// Where authorization codes are exchanged for tokens.
    pub token_url: Url,
}

/// Validated, normalized provider settings.
///
/// Equality, ordering and hashing cover every field, secret included.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderDescriptor {
    /// Registry identity.
    pub config_id: ProviderConfigId,
    /// Normalized base URL of the backend.
    pub base_url: String,
    /// Derived endpoints.
    pub endpoints: OAuthEndpoints,
    /// Fixed scope list.
    pub scopes: Vec<String>,
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: ClientSecret,
    /// Name shown on the sign-in button.
    pub display_name: String,
    /// Whether new accounts may be created on first sign-in.
    pub allow_signup: bool,
}

impl ProviderDescriptor {
    /// Short digest of every field, for log lines.
    ///
    /// The secret feeds the digest, so a rotation changes the fingerprint,
    /// but it cannot be recovered from it.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let scopes = self.scopes.join(" ");
        let mut hasher = Sha256::new();
        for part in [
            self.config_id.kind.as_str(),
            self.base_url.as_str(),
            self.endpoints.auth_url.as_str(),
            self.endpoints.token_url.as_str(),
            scopes.as_str(),
            self.client_id.as_str(),
            self.client_secret.expose(),
            self.display_name.as_str(),
            if self.allow_signup { "1" } else { "0" },
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hex::encode(hasher.finalize());
        digest[..12].to_string()
    }
}

/// Public, secret-free view of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub config_id: ProviderConfigId,
    pub display_name: String,
    /// The backend this provider authenticates against.
    pub service_id: String,
    pub client_id: String,
    pub authorization_url: String,
    pub allow_signup: bool,
}

/// A live auth provider instance.
///
/// Instances are immutable after construction.
pub trait AuthProvider: Send + Sync + fmt::Debug {
    /// Registry identity.
    fn config_id(&self) -> &ProviderConfigId;

    /// Settings this instance was built from.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Process-unique instance number; two instances built from equal
    /// descriptors still differ here.
    fn instance(&self) -> u64;

    /// Secret-free summary for listings.
    fn info(&self) -> ProviderInfo;

    /// URL to redirect a user to in order to start the OAuth flow.
    fn authorization_url(&self, state: &str, redirect_uri: &Url) -> Url;
}

/// Desired or active provider set, keyed by descriptor value.
pub type DesiredProviderMap = BTreeMap<ProviderDescriptor, Arc<dyn AuthProvider>>;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// OAuth 2.0 authorization-code provider.
#[derive(Debug)]
pub struct OAuthProvider {
    descriptor: ProviderDescriptor,
    instance: u64,
}

impl OAuthProvider {
    /// Build a provider from a validated descriptor. Performs no I/O.
    #[must_use]
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        Self {
            descriptor,
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Client secret for the token exchange.
    #[must_use]
    pub fn client_secret(&self) -> &ClientSecret {
        &self.descriptor.client_secret
    }

    /// Token endpoint for the code exchange.
    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.descriptor.endpoints.token_url
    }
}

impl AuthProvider for OAuthProvider {
    fn config_id(&self) -> &ProviderConfigId {
        &self.descriptor.config_id
    }

    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn instance(&self) -> u64 {
        self.instance
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            config_id: self.descriptor.config_id.clone(),
            display_name: self.descriptor.display_name.clone(),
            service_id: self.descriptor.base_url.clone(),
            client_id: self.descriptor.client_id.clone(),
            authorization_url: self.descriptor.endpoints.auth_url.to_string(),
            allow_signup: self.descriptor.allow_signup,
        }
    }

    fn authorization_url(&self, state: &str, redirect_uri: &Url) -> Url {
        let mut url = self.descriptor.endpoints.auth_url.clone();
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.descriptor.client_id);
            params.append_pair("redirect_uri", redirect_uri.as_str());
            params.append_pair("scope", &self.descriptor.scopes.join(" "));
            params.append_pair("state", state);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(secret: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            config_id: ProviderConfigId::new("github", "https://github.com"),
            base_url: "https://github.com".to_string(),
            endpoints: OAuthEndpoints {
                auth_url: Url::parse("https://github.com/login/oauth/authorize").unwrap(),
                token_url: Url::parse("https://github.com/login/oauth/access_token").unwrap(),
            },
            scopes: vec!["repo".to_string()],
            client_id: "client-123".to_string(),
            client_secret: ClientSecret::new(secret),
            display_name: "GitHub".to_string(),
            allow_signup: false,
        }
    }

    #[test]
    fn test_config_id_display() {
        let id = ProviderConfigId::new("github", "https://ghe.example.com");
        assert_eq!(id.to_string(), "github:https://ghe.example.com");
    }

    #[test]
    fn test_descriptor_equality_includes_secret() {
        assert_eq!(descriptor("s1"), descriptor("s1"));
        assert_ne!(descriptor("s1"), descriptor("s2"));
    }

    #[test]
    fn test_fingerprint_hides_secret() {
        let a = descriptor("super-secret-value");
        let fp = a.fingerprint();
        assert_eq!(fp.len(), 12);
        assert!(!fp.contains("super"));
        assert_eq!(fp, descriptor("super-secret-value").fingerprint());
        assert_ne!(fp, descriptor("rotated").fingerprint());
    }

    #[test]
    fn test_instances_are_unique() {
        let a = OAuthProvider::new(descriptor("s1"));
        let b = OAuthProvider::new(descriptor("s1"));
        assert_ne!(a.instance(), b.instance());
        assert_eq!(a.descriptor(), b.descriptor());
    }

    #[test]
    fn test_info_has_no_secret() {
        let provider = OAuthProvider::new(descriptor("hunter2"));
        let info = provider.info();
        assert_eq!(info.service_id, "https://github.com");
        assert_eq!(
            info.authorization_url,
            "https://github.com/login/oauth/authorize"
        );

        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!format!("{provider:?}").contains("hunter2"));
    }

    #[test]
    fn test_authorization_url() {
        let provider = OAuthProvider::new(descriptor("s1"));
        let redirect = Url::parse("https://app.example.com/auth/callback").unwrap();
        let url = provider.authorization_url("xyz", &redirect);

        assert_eq!(url.path(), "/login/oauth/authorize");
        let pairs: BTreeMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["redirect_uri"], "https://app.example.com/auth/callback");
        assert_eq!(pairs["scope"], "repo");
        assert_eq!(pairs["state"], "xyz");
        assert_eq!(provider.token_url().path(), "/login/oauth/access_token");
    }
}
