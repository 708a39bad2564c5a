//! Site configuration document.
//!
//! The document is the unit of distribution: every change event means
//! "re-read the whole document". Auth provider records are internally tagged
//! by `type`, and subsystems pick out the records they own.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ConfigError;

/// The full site configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Logging settings (hot-reloadable).
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl SiteConfig {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::parse(format!("TOML parse error: {e}")))
    }

    /// Parse from JSON value
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value)
            .map_err(|e| ConfigError::parse(format!("JSON parse error: {e}")))
    }

    /// Add an auth provider record.
    pub fn with_provider(mut self, provider: AuthProviderConfig) -> Self {
        self.auth.providers.push(provider);
        self
    }

    /// Iterate over the GitHub provider records in document order.
    pub fn github_providers(&self) -> impl Iterator<Item = &GitHubAuthProvider> {
        self.auth.providers.iter().filter_map(|p| match p {
            AuthProviderConfig::Github(github) => Some(github),
            _ => None,
        })
    }
}

/// Logging section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `gatehouse_auth=debug,info`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Authentication section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Configured auth provider records, in document order. Not necessarily unique.
    #[serde(default)]
    pub providers: Vec<AuthProviderConfig>,
}

/// One auth provider record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthProviderConfig {
    /// GitHub / GitHub Enterprise OAuth.
    Github(GitHubAuthProvider),
    /// Username/password accounts stored locally.
    Builtin(BuiltinAuthProvider),
    /// Any provider type this build does not know about.
    #[serde(other)]
    Other,
}

impl AuthProviderConfig {
    /// The `type` tag of this record.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Github(_) => "github",
            Self::Builtin(_) => "builtin",
            Self::Other => "other",
        }
    }
}

/// GitHub OAuth provider record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GitHubAuthProvider {
    /// Base URL of the GitHub instance. Empty means github.com.
    #[serde(default)]
    pub url: String,

    /// OAuth application client ID.
    #[serde(alias = "clientID", alias = "clientId")]
    pub client_id: String,

    /// OAuth application client secret.
    #[serde(alias = "clientSecret")]
    pub client_secret: ClientSecret,

    /// Name shown on the sign-in button.
    #[serde(
        default,
        alias = "displayName",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,

    /// Whether new accounts may be created on first sign-in.
    #[serde(default, alias = "allowSignup")]
    pub allow_signup: bool,
}

impl GitHubAuthProvider {
    /// Create a record with the required fields.
    pub fn new(
        url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            client_id: client_id.into(),
            client_secret: ClientSecret::new(client_secret),
            display_name: None,
            allow_signup: false,
        }
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set whether sign-up is allowed.
    pub fn with_allow_signup(mut self, allow: bool) -> Self {
        self.allow_signup = allow;
        self
    }
}

/// Builtin provider record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinAuthProvider {
    #[serde(default, alias = "allowSignup")]
    pub allow_signup: bool,
}

/// OAuth client secret.
///
/// Compared and hashed by value, but never printed.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientSecret(String);

impl ClientSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret. Only for handing to the token exchange.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret(<secret>)")
    }
}

impl fmt::Display for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<secret>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_document() {
        let doc = SiteConfig::from_toml(
            r#"
[logging]
level = "debug"

[[auth.providers]]
type = "github"
url = "https://github.example.com/"
client_id = "abc"
client_secret = "s3cret"
display_name = "GHE"

[[auth.providers]]
type = "builtin"
allow_signup = true

[[auth.providers]]
type = "openidconnect"
issuer = "https://accounts.example.com"
"#,
        )
        .unwrap();

        assert_eq!(doc.logging.level, "debug");
        assert_eq!(doc.auth.providers.len(), 3);
        assert_eq!(doc.auth.providers[1].kind(), "builtin");
        assert_eq!(doc.auth.providers[2], AuthProviderConfig::Other);

        let github: Vec<_> = doc.github_providers().collect();
        assert_eq!(github.len(), 1);
        assert_eq!(github[0].client_id, "abc");
        assert_eq!(github[0].client_secret.expose(), "s3cret");
        assert_eq!(github[0].display_name.as_deref(), Some("GHE"));
    }

    #[test]
    fn test_parse_camel_case_aliases() {
        let doc = SiteConfig::from_json(serde_json::json!({
            "auth": {
                "providers": [{
                    "type": "github",
                    "clientID": "id",
                    "clientSecret": "secret",
                    "allowSignup": true
                }]
            }
        }))
        .unwrap();

        let github = doc.github_providers().next().unwrap();
        assert_eq!(github.url, "");
        assert_eq!(github.client_id, "id");
        assert!(github.allow_signup);
    }

    #[test]
    fn test_empty_document_defaults() {
        let doc = SiteConfig::from_toml("").unwrap();
        assert_eq!(doc.logging.level, "info");
        assert!(doc.auth.providers.is_empty());
    }

    #[test]
    fn test_missing_client_id_is_parse_error() {
        let result = SiteConfig::from_toml(
            r#"
[[auth.providers]]
type = "github"
client_secret = "x"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_client_secret_is_redacted() {
        let provider = GitHubAuthProvider::new("", "id", "hunter2");
        let debug = format!("{provider:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<secret>"));
        assert_eq!(provider.client_secret.to_string(), "<secret>");
    }
}
