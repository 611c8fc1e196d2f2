use crate::connectors::Provider;
use figment::{Figment, providers::Env};
use serde::Deserialize;
use std::sync::LazyLock;
use url::Url;

/// Environment prefix for all settings, e.g. `DRIVEHUB_DATABASE_URL`.
/// Nested provider credentials use a double underscore:
/// `DRIVEHUB_GOOGLE__CLIENT_ID`, `DRIVEHUB_ONEDRIVE__CLIENT_SECRET`.
const ENV_PREFIX: &str = "DRIVEHUB_";

#[derive(Debug, Clone, Deserialize)]
pub struct OauthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// Base64-encoded 32-byte key for credential encryption at rest.
    /// Required; the process refuses to start without it.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Externally reachable base URL, used to build OAuth redirect URIs.
    #[serde(default = "default_public_url")]
    pub public_url: Url,

    #[serde(default = "default_sync_concurrency")]
    pub sync_concurrency: usize,

    #[serde(default)]
    pub google: Option<OauthClientConfig>,

    #[serde(default)]
    pub onedrive: Option<OauthClientConfig>,
}

impl Config {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// The OAuth client pair configured for a provider, if any.
    pub fn oauth_client(&self, provider: Provider) -> Option<&OauthClientConfig> {
        match provider {
            Provider::Google => self.google.as_ref(),
            Provider::Onedrive => self.onedrive.as_ref(),
        }
    }

    /// Redirect URI registered with the provider: `{public_url}auth/{tag}/callback`.
    pub fn redirect_uri(&self, provider: Provider) -> Result<Url, url::ParseError> {
        self.public_url
            .join(&format!("auth/{}/callback", provider.as_str()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            listen: default_listen(),
            loglevel: default_loglevel(),
            secret_key: None,
            public_url: default_public_url(),
            sync_concurrency: default_sync_concurrency(),
            google: None,
            onedrive: None,
        }
    }
}

fn default_database_url() -> String {
    "sqlite:drivehub.sqlite".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_public_url() -> Url {
    Url::parse("http://localhost:8000/").expect("static default URL")
}

fn default_sync_concurrency() -> usize {
    4
}

pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: invalid configuration"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_uri_is_rooted_at_public_url() {
        let mut cfg = Config::default();
        cfg.public_url = Url::parse("https://hub.example.com/").unwrap();
        assert_eq!(
            cfg.redirect_uri(Provider::Google).unwrap().as_str(),
            "https://hub.example.com/auth/google/callback"
        );
        assert_eq!(
            cfg.redirect_uri(Provider::Onedrive).unwrap().as_str(),
            "https://hub.example.com/auth/onedrive/callback"
        );
    }

    #[test]
    fn providers_without_credentials_are_unconfigured() {
        let cfg = Config::default();
        assert!(cfg.oauth_client(Provider::Google).is_none());
        assert!(cfg.oauth_client(Provider::Onedrive).is_none());
    }
}
