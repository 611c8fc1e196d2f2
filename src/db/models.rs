use crate::connectors::Provider;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A raw `accounts` row. Sensitive columns hold ciphertext and are never
/// serialized; [`crate::db::AccountStore::decrypt`] produces the usable view.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub id: i64,
    pub email: String,
    pub provider: Provider,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_uri: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Decrypted account credentials, held in memory only for the duration of a
/// single operation.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub provider: Provider,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_uri: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Operator-facing account summary. Exposes whether a refresh token exists,
/// never the token material itself.
#[derive(Debug, Clone, Serialize)]
pub struct AccountOverview {
    pub id: i64,
    pub email: String,
    pub provider: Provider,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub has_refresh_token: bool,
}
