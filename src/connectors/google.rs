//! Google Drive connector: OAuth2 against accounts.google.com, file listing
//! against the Drive v3 API.

use super::{
    Connector, CredentialBundle, FileSummary, PAGE_SIZE, Provider, RefreshOutcome,
    listing_window_start,
};
use crate::db::models::Account;
use crate::error::HubError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/drive.readonly",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// Clock skew applied when judging the stored expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

type Oauth2Client = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Google endpoint set; overridable so tests can target a local stub.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub files_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
            files_url: "https://www.googleapis.com/drive/v3/files".to_string(),
        }
    }
}

pub struct GoogleConnector {
    client_id: String,
    client_secret: String,
    redirect_uri: Url,
    endpoints: GoogleEndpoints,
    http: reqwest::Client,
}

impl GoogleConnector {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: Url,
        http: reqwest::Client,
    ) -> Self {
        Self::with_endpoints(
            client_id,
            client_secret,
            redirect_uri,
            GoogleEndpoints::default(),
            http,
        )
    }

    pub fn with_endpoints(
        client_id: String,
        client_secret: String,
        redirect_uri: Url,
        endpoints: GoogleEndpoints,
        http: reqwest::Client,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            endpoints,
            http,
        }
    }

    fn oauth2_client(
        &self,
        client_id: &str,
        client_secret: &str,
        token_url: &str,
    ) -> Result<Oauth2Client, HubError> {
        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_auth_uri(AuthUrl::new(self.endpoints.auth_url.clone())?)
            .set_token_uri(TokenUrl::new(token_url.to_string())?)
            .set_redirect_uri(RedirectUrl::new(self.redirect_uri.to_string())?);
        Ok(client)
    }

    async fn fetch_email(&self, access_token: &str) -> Result<String, HubError> {
        let resp: UserInfo = self
            .http
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        resp.email.ok_or(HubError::MissingEmail)
    }
}

#[async_trait]
impl Connector for GoogleConnector {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn authorization_url(&self) -> Result<Url, HubError> {
        let client =
            self.oauth2_client(&self.client_id, &self.client_secret, &self.endpoints.token_url)?;
        // offline + forced consent so a refresh token is issued on first grant
        let (url, _csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(SCOPES.iter().map(|s| Scope::new((*s).to_string())))
            .add_extra_param("access_type", "offline")
            .add_extra_param("include_granted_scopes", "true")
            .add_extra_param("prompt", "consent")
            .url();
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<CredentialBundle, HubError> {
        let client =
            self.oauth2_client(&self.client_id, &self.client_secret, &self.endpoints.token_url)?;
        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| HubError::AuthExchange(format!("google code exchange: {e}")))?;

        let access_token = token.access_token().secret().clone();
        let email = self
            .fetch_email(&access_token)
            .await
            .map_err(|e| HubError::AuthExchange(format!("google identity lookup: {e}")))?;
        info!(email = %email, "google code exchange succeeded");

        let scopes = token
            .scopes()
            .map(|s| s.iter().map(|sc| sc.to_string()).collect())
            .unwrap_or_else(|| SCOPES.iter().map(|s| s.to_string()).collect());

        Ok(CredentialBundle {
            provider: Provider::Google,
            email,
            access_token,
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            token_uri: self.endpoints.token_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes,
            expires_at: token
                .expires_in()
                .map(|d| Utc::now() + Duration::from_std(d).unwrap_or_else(|_| Duration::zero())),
        })
    }

    async fn refresh(&self, account: &mut Account) -> RefreshOutcome {
        // The stored expiry is advisory; a token with a live expiry is used
        // as-is, everything else goes through the provider's refresh flow.
        if let Some(expiry) = account.token_expires_at
            && expiry > Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS)
        {
            return RefreshOutcome::Unchanged;
        }

        let Some(refresh_token) = account.refresh_token.clone() else {
            if account.token_expires_at.is_some() {
                return RefreshOutcome::Failed(
                    "access token expired and no refresh token stored".to_string(),
                );
            }
            // No expiry on record and nothing to refresh with; use as-is.
            return RefreshOutcome::Unchanged;
        };

        let (Some(client_id), Some(client_secret)) =
            (account.client_id.as_deref(), account.client_secret.as_deref())
        else {
            return RefreshOutcome::Failed("stored client credentials incomplete".to_string());
        };
        let token_uri = account
            .token_uri
            .clone()
            .unwrap_or_else(|| self.endpoints.token_url.clone());

        let client = match self.oauth2_client(client_id, client_secret, &token_uri) {
            Ok(c) => c,
            Err(e) => return RefreshOutcome::Failed(e.to_string()),
        };

        match client
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(&self.http)
            .await
        {
            Ok(token) => {
                account.access_token = Some(token.access_token().secret().clone());
                if let Some(new_refresh) = token.refresh_token() {
                    account.refresh_token = Some(new_refresh.secret().clone());
                }
                account.token_expires_at = token
                    .expires_in()
                    .map(|d| Utc::now() + Duration::from_std(d).unwrap_or_else(|_| Duration::zero()));
                info!(email = %account.email, "google access token refreshed");
                RefreshOutcome::Refreshed
            }
            Err(e) => {
                let err: HubError = e.into();
                RefreshOutcome::Failed(err.to_string())
            }
        }
    }

    async fn list_recent_files(
        &self,
        account: &Account,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FileSummary>, HubError> {
        let access_token = account
            .access_token
            .as_deref()
            .ok_or(HubError::MissingAccessToken)?;

        let start = listing_window_start(since, Utc::now());
        let query = drive_query(start);
        debug!(email = %account.email, query = %query, "drive listing");

        let resp = self
            .http
            .get(&self.endpoints.files_url)
            .bearer_auth(access_token)
            .query(&[
                ("q", query.as_str()),
                ("pageSize", &PAGE_SIZE.to_string()),
                ("fields", "nextPageToken, files(id, name, modifiedTime)"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(HubError::Listing(format!(
                "google drive returned {status}: {body}"
            )));
        }

        let listing: FileListResponse = resp.json().await?;
        Ok(listing
            .files
            .into_iter()
            .map(|f| FileSummary {
                id: f.id,
                name: f.name,
                modified_time: f.modified_time,
            })
            .collect())
    }
}

/// Drive search expression. Strictly-greater comparison on `modifiedTime`;
/// OneDrive uses greater-or-equal (see `onedrive::graph_filter`).
fn drive_query(start: DateTime<Utc>) -> String {
    let time_str = start.to_rfc3339_opts(SecondsFormat::Secs, true);
    format!("modifiedTime > '{time_str}' and trashed = false")
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(rename = "modifiedTime")]
    modified_time: String,
}
