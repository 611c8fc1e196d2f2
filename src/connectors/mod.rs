//! Provider connectors: OAuth2 auth and file-listing behind one contract.

pub mod google;
pub mod onedrive;

use crate::config::Config;
use crate::db::models::Account;
use crate::error::HubError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration as StdDuration;
use url::Url;

/// Upper bound on items returned by one listing call. Single page only;
/// pagination is out of scope.
pub const PAGE_SIZE: u32 = 10;

/// Look-back window applied when an account has never been synced.
const DEFAULT_LOOKBACK_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Onedrive,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Onedrive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Onedrive => "onedrive",
        }
    }

    /// Parse a wire tag. Fails closed on anything outside the variant set.
    pub fn parse(tag: &str) -> Result<Self, HubError> {
        match tag {
            "google" => Ok(Provider::Google),
            "onedrive" => Ok(Provider::Onedrive),
            other => Err(HubError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized result of a successful authorization-code exchange.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    pub provider: Provider,
    pub email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Token endpoint (Google) or authority (OneDrive) used for refresh.
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: String,
    pub name: String,
    pub modified_time: String,
}

/// Ternary outcome of a token-refresh attempt. `Failed` leaves the in-memory
/// credentials untouched.
#[derive(Debug)]
pub enum RefreshOutcome {
    Unchanged,
    Refreshed,
    Failed(String),
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn provider(&self) -> Provider;

    /// Consent-redirect URL for the configured client. Pure URL construction,
    /// safe to call repeatedly; requests offline access so a refresh token is
    /// issued on first consent.
    fn authorization_url(&self) -> Result<Url, HubError>;

    /// One-time code exchange plus a single identity lookup to resolve the
    /// account email. This is the only operation that yields a refresh token.
    async fn exchange_code(&self, code: &str) -> Result<CredentialBundle, HubError>;

    /// Decide whether the stored access token is usable; renew it through the
    /// provider's refresh flow when it is not. Mutates `account` in place only
    /// on `Refreshed`; the caller persists the change.
    async fn refresh(&self, account: &mut Account) -> RefreshOutcome;

    /// One page of files modified since `since` (or the default look-back
    /// window), trashed items excluded, in provider order. No internal retry.
    async fn list_recent_files(
        &self,
        account: &Account,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FileSummary>, HubError>;
}

/// Start of the listing window: the account watermark, or `now` minus the
/// default look-back for never-synced accounts.
pub(crate) fn listing_window_start(
    since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    since.unwrap_or_else(|| now - Duration::minutes(DEFAULT_LOOKBACK_MINUTES))
}

/// Shared HTTP client for all connector traffic. Bounded timeouts so a stuck
/// provider call becomes that operation's failure outcome.
pub(crate) fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("drivehub/0.1")
        .connect_timeout(StdDuration::from_secs(5))
        .timeout(StdDuration::from_secs(15))
        .build()
        .expect("FATAL: initialize connector HTTP client failed")
}

/// Maps a provider tag to its connector. Read-only after construction.
pub struct ConnectorRegistry {
    connectors: HashMap<Provider, Box<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new(connectors: Vec<Box<dyn Connector>>) -> Self {
        Self {
            connectors: connectors.into_iter().map(|c| (c.provider(), c)).collect(),
        }
    }

    /// Register a connector for every provider with configured client
    /// credentials; the rest stay unavailable and `resolve` fails closed.
    pub fn from_config(cfg: &Config) -> Result<Self, HubError> {
        let http = build_http_client();
        let mut connectors: Vec<Box<dyn Connector>> = Vec::new();

        if let Some(client) = cfg.oauth_client(Provider::Google) {
            let redirect = cfg.redirect_uri(Provider::Google)?;
            connectors.push(Box::new(google::GoogleConnector::new(
                client.client_id.clone(),
                client.client_secret.clone(),
                redirect,
                http.clone(),
            )));
        }
        if let Some(client) = cfg.oauth_client(Provider::Onedrive) {
            let redirect = cfg.redirect_uri(Provider::Onedrive)?;
            connectors.push(Box::new(onedrive::OneDriveConnector::new(
                client.client_id.clone(),
                client.client_secret.clone(),
                redirect,
                http.clone(),
            )));
        }

        Ok(Self::new(connectors))
    }

    pub fn resolve(&self, provider: Provider) -> Result<&dyn Connector, HubError> {
        self.connectors
            .get(&provider)
            .map(|c| c.as_ref())
            .ok_or_else(|| HubError::UnknownProvider(provider.to_string()))
    }

    pub fn is_available(&self, provider: Provider) -> bool {
        self.connectors.contains_key(&provider)
    }

    /// Configured providers, in declaration order.
    pub fn available(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.connectors.contains_key(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn provider_tags_round_trip() {
        for p in Provider::ALL {
            assert_eq!(Provider::parse(p.as_str()).unwrap(), p);
        }
    }

    #[test]
    fn unknown_tag_fails_closed() {
        let err = Provider::parse("dropbox").unwrap_err();
        assert!(matches!(err, HubError::UnknownProvider(tag) if tag == "dropbox"));
    }

    #[test]
    fn empty_registry_resolves_nothing() {
        let registry = ConnectorRegistry::new(Vec::new());
        assert!(registry.resolve(Provider::Google).is_err());
        assert!(registry.available().is_empty());
    }

    #[test]
    fn window_start_uses_watermark_when_present() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mark = Utc.with_ymd_and_hms(2024, 5, 1, 11, 57, 0).unwrap();
        assert_eq!(listing_window_start(Some(mark), now), mark);
    }

    #[test]
    fn window_start_defaults_to_fifteen_minute_lookback() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 11, 45, 0).unwrap();
        assert_eq!(listing_window_start(None, now), expected);
    }
}
