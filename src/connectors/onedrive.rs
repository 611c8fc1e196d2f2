//! OneDrive connector: OAuth2 against the Microsoft identity platform, file
//! listing against Microsoft Graph.

use super::{
    Connector, CredentialBundle, FileSummary, PAGE_SIZE, Provider, RefreshOutcome,
    listing_window_start,
};
use crate::db::models::Account;
use crate::error::HubError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

pub const SCOPES: [&str; 3] = ["Files.Read.All", "User.Read", "offline_access"];

type Oauth2Client = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Microsoft endpoint set; overridable so tests can target a local stub.
/// `authority` is also what gets persisted as the account's `token_uri`.
#[derive(Debug, Clone)]
pub struct OneDriveEndpoints {
    pub authority: String,
    pub graph_base: String,
}

impl Default for OneDriveEndpoints {
    fn default() -> Self {
        Self {
            authority: "https://login.microsoftonline.com/common".to_string(),
            graph_base: "https://graph.microsoft.com/v1.0".to_string(),
        }
    }
}

impl OneDriveEndpoints {
    fn auth_url(authority: &str) -> String {
        format!("{authority}/oauth2/v2.0/authorize")
    }

    fn token_url(authority: &str) -> String {
        format!("{authority}/oauth2/v2.0/token")
    }
}

pub struct OneDriveConnector {
    client_id: String,
    client_secret: String,
    redirect_uri: Url,
    endpoints: OneDriveEndpoints,
    http: reqwest::Client,
}

impl OneDriveConnector {
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
            OneDriveEndpoints::default(),
            http,
        )
    }

    pub fn with_endpoints(
        client_id: String,
        client_secret: String,
        redirect_uri: Url,
        endpoints: OneDriveEndpoints,
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
        authority: &str,
    ) -> Result<Oauth2Client, HubError> {
        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_auth_uri(AuthUrl::new(OneDriveEndpoints::auth_url(authority))?)
            .set_token_uri(TokenUrl::new(OneDriveEndpoints::token_url(authority))?)
            .set_redirect_uri(RedirectUrl::new(self.redirect_uri.to_string())?);
        Ok(client)
    }

    async fn fetch_email(&self, access_token: &str) -> Result<String, HubError> {
        let me: GraphUser = self
            .http
            .get(format!("{}/me", self.endpoints.graph_base))
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        me.user_principal_name
            .or(me.mail)
            .ok_or(HubError::MissingEmail)
    }
}

#[async_trait]
impl Connector for OneDriveConnector {
    fn provider(&self) -> Provider {
        Provider::Onedrive
    }

    fn authorization_url(&self) -> Result<Url, HubError> {
        let client = self.oauth2_client(
            &self.client_id,
            &self.client_secret,
            &self.endpoints.authority,
        )?;
        // offline_access in the scope set is what yields a refresh token here
        let (url, _csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(SCOPES.iter().map(|s| Scope::new((*s).to_string())))
            .url();
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<CredentialBundle, HubError> {
        let client = self.oauth2_client(
            &self.client_id,
            &self.client_secret,
            &self.endpoints.authority,
        )?;
        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| HubError::AuthExchange(format!("onedrive code exchange: {e}")))?;

        let access_token = token.access_token().secret().clone();
        let email = self
            .fetch_email(&access_token)
            .await
            .map_err(|e| HubError::AuthExchange(format!("graph identity lookup: {e}")))?;
        info!(email = %email, "onedrive code exchange succeeded");

        let scopes = token
            .scopes()
            .map(|s| s.iter().map(|sc| sc.to_string()).collect())
            .unwrap_or_else(|| SCOPES.iter().map(|s| s.to_string()).collect());

        Ok(CredentialBundle {
            provider: Provider::Onedrive,
            email,
            access_token,
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            // The authority, not a token endpoint; the refresh path derives
            // the full URL from it.
            token_uri: self.endpoints.authority.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes,
            expires_at: token
                .expires_in()
                .map(|d| Utc::now() + Duration::from_std(d).unwrap_or_else(|_| Duration::zero())),
        })
    }

    async fn refresh(&self, account: &mut Account) -> RefreshOutcome {
        // No local validity check for Microsoft tokens; every pass goes
        // through the refresh-token flow.
        let Some(refresh_token) = account.refresh_token.clone() else {
            return RefreshOutcome::Failed("no refresh token stored".to_string());
        };
        let (Some(client_id), Some(client_secret)) =
            (account.client_id.as_deref(), account.client_secret.as_deref())
        else {
            return RefreshOutcome::Failed("stored client credentials incomplete".to_string());
        };
        let authority = account
            .token_uri
            .clone()
            .unwrap_or_else(|| self.endpoints.authority.clone());

        let client = match self.oauth2_client(client_id, client_secret, &authority) {
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
                info!(email = %account.email, "onedrive access token refreshed");
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
        let filter = graph_filter(start);
        debug!(email = %account.email, filter = %filter, "graph listing");

        let resp = self
            .http
            .get(format!("{}/me/drive/root/children", self.endpoints.graph_base))
            .bearer_auth(access_token)
            .query(&[
                ("$filter", filter.as_str()),
                ("$select", "id,name,lastModifiedDateTime"),
                ("$top", &PAGE_SIZE.to_string()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(HubError::Listing(format!(
                "microsoft graph returned {status}: {body}"
            )));
        }

        let listing: DriveChildren = resp.json().await?;
        Ok(listing
            .value
            .into_iter()
            .map(|item| FileSummary {
                id: item.id,
                name: item.name,
                modified_time: item.last_modified,
            })
            .collect())
    }
}

/// OData filter expression. Greater-or-equal on `lastModifiedDateTime`;
/// Google uses strictly-greater (see `google::drive_query`).
fn graph_filter(start: DateTime<Utc>) -> String {
    format!(
        "lastModifiedDateTime ge {}",
        start.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

#[derive(Debug, Deserialize)]
struct GraphUser {
    #[serde(rename = "userPrincipalName")]
    user_principal_name: Option<String>,
    mail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveChildren {
    #[serde(default)]
    value: Vec<DriveItem>,
}

#[derive(Debug, Deserialize)]
struct DriveItem {
    id: String,
    name: String,
    #[serde(rename = "lastModifiedDateTime")]
    last_modified: String,
}
