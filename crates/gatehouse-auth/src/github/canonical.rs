//! Canonicalization of GitHub provider records.

use gatehouse_config::GitHubAuthProvider;
use url::Url;

use crate::provider::{OAuthEndpoints, ProviderConfigId, ProviderDescriptor};

/// Provider type tag for GitHub records.
pub const PROVIDER_KIND: &str = "github";

/// Base URL used when a record leaves `url` empty.
pub const DEFAULT_GITHUB_URL: &str = "https://github.com/";

/// Display name used when a record leaves `display_name` unset.
pub const DEFAULT_DISPLAY_NAME: &str = "GitHub";

/// Scopes requested from every GitHub instance: read access to repositories.
pub const GITHUB_SCOPES: &[&str] = &["repo"];

const AUTHORIZE_PATH: &str = "/login/oauth/authorize";
const ACCESS_TOKEN_PATH: &str = "/login/oauth/access_token";

/// Normalize a parsed base URL into its canonical identity string.
///
/// Lowercase scheme and host, non-default port kept, path kept without
/// trailing slashes, query and fragment dropped. Returns `None` when the
/// URL is not http(s) or has no host.
#[must_use]
pub fn normalize_base_url(url: &Url) -> Option<String> {
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();

    let mut normalized = format!("{scheme}://{host}");
    if let Some(port) = url.port() {
        normalized.push_str(&format!(":{port}"));
    }
    normalized.push_str(url.path().trim_end_matches('/'));
    Some(normalized)
}

/// Turn one GitHub record into a validated descriptor, or a problem string.
pub fn canonicalize(record: &GitHubAuthProvider) -> Result<ProviderDescriptor, String> {
    let raw_url = match record.url.trim() {
        "" => DEFAULT_GITHUB_URL,
        url => url,
    };

    let parsed = Url::parse(raw_url).map_err(|_| {
        format!(
            "Could not parse GitHub URL {raw_url:?}. You will not be able to login via this GitHub instance."
        )
    })?;

    let base_url = normalize_base_url(&parsed).ok_or_else(|| {
        format!(
            "GitHub URL {raw_url:?} must be an http or https URL with a host. You will not be able to login via this GitHub instance."
        )
    })?;

    let endpoint = |path: &str| {
        Url::parse(&format!("{}{path}", base_url.trim_end_matches('/'))).map_err(|e| {
            format!("Could not derive GitHub OAuth endpoint from {raw_url:?}: {e}")
        })
    };
    let endpoints = OAuthEndpoints {
        auth_url: endpoint(AUTHORIZE_PATH)?,
        token_url: endpoint(ACCESS_TOKEN_PATH)?,
    };

    let display_name = record
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DISPLAY_NAME)
        .to_string();

    Ok(ProviderDescriptor {
        config_id: ProviderConfigId::new(PROVIDER_KIND, base_url.clone()),
        base_url,
        endpoints,
        scopes: GITHUB_SCOPES.iter().map(|s| (*s).to_string()).collect(),
        client_id: record.client_id.clone(),
        client_secret: record.client_secret.clone(),
        display_name,
        allow_signup: record.allow_signup,
    })
}
