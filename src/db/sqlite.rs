use crate::connectors::{CredentialBundle, Provider};
use crate::crypto::CredentialCodec;
use crate::db::models::{Account, AccountOverview, AccountRecord};
use crate::db::schema::SQLITE_INIT;
use crate::error::HubError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use std::sync::Arc;

pub type SqlitePool = Pool<Sqlite>;

const COLUMNS: &str = "id, email, provider, access_token, refresh_token, \
    client_id, client_secret, token_uri, scopes, last_synced_at, token_expires_at";

/// Account persistence. Every sensitive column passes through the
/// [`CredentialCodec`] on its way in and out; callers above this layer only
/// ever see decrypted values inside an [`Account`].
#[derive(Clone)]
pub struct AccountStore {
    pool: SqlitePool,
    codec: Arc<CredentialCodec>,
}

impl AccountStore {
    pub fn new(pool: SqlitePool, codec: Arc<CredentialCodec>) -> Self {
        Self { pool, codec }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), HubError> {
        // execute multiple statements safely (SQLite supports multi-commands but sqlx::query doesn't)
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Upsert by unique email: a new link for an existing email overwrites the
    /// provider and credential fields of that row. The watermark is left
    /// alone. Returns the row id.
    pub async fn upsert(&self, bundle: &CredentialBundle) -> Result<i64, HubError> {
        let access_token = self.codec.encrypt(Some(&bundle.access_token))?;
        let refresh_token = self.codec.encrypt(bundle.refresh_token.as_deref())?;
        let client_id = self.codec.encrypt(Some(&bundle.client_id))?;
        let client_secret = self.codec.encrypt(Some(&bundle.client_secret))?;
        let scopes_json = serde_json::to_string(&bundle.scopes)?;
        let expires_at = bundle.expires_at.map(|t| t.to_rfc3339());

        sqlx::query(
            r#"
            INSERT INTO accounts (
                email, provider, access_token, refresh_token,
                client_id, client_secret, token_uri, scopes, token_expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                provider=excluded.provider,
                access_token=excluded.access_token,
                refresh_token=excluded.refresh_token,
                client_id=excluded.client_id,
                client_secret=excluded.client_secret,
                token_uri=excluded.token_uri,
                scopes=excluded.scopes,
                token_expires_at=excluded.token_expires_at
            "#,
        )
        .bind(&bundle.email)
        .bind(bundle.provider.as_str())
        .bind(access_token)
        .bind(refresh_token)
        .bind(client_id)
        .bind(client_secret)
        .bind(&bundle.token_uri)
        .bind(scopes_json)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        let rec: (i64,) = sqlx::query_as("SELECT id FROM accounts WHERE email = ?")
            .bind(&bundle.email)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec.0)
    }

    /// Accounts whose provider is in `filter`; an empty filter selects all.
    pub async fn list(&self, filter: &[Provider]) -> Result<Vec<AccountRecord>, HubError> {
        let rows = if filter.is_empty() {
            sqlx::query(&format!("SELECT {COLUMNS} FROM accounts ORDER BY id"))
                .fetch_all(&self.pool)
                .await?
        } else {
            let placeholders = vec!["?"; filter.len()].join(", ");
            let sql = format!(
                "SELECT {COLUMNS} FROM accounts WHERE provider IN ({placeholders}) ORDER BY id"
            );
            let mut query = sqlx::query(&sql);
            for p in filter {
                query = query.bind(p.as_str());
            }
            query.fetch_all(&self.pool).await?
        };
        rows.into_iter().map(Self::row_to_record).collect()
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<AccountRecord>, HubError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM accounts WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_record).transpose()
    }

    /// Operator-facing summaries; never decrypts anything.
    pub async fn list_overview(&self) -> Result<Vec<AccountOverview>, HubError> {
        let rows = sqlx::query(
            "SELECT id, email, provider, last_synced_at, \
             refresh_token IS NOT NULL AS has_refresh_token \
             FROM accounts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| -> Result<AccountOverview, HubError> {
                let provider_tag: String = row.try_get("provider")?;
                Ok(AccountOverview {
                    id: row.try_get("id")?,
                    email: row.try_get("email")?,
                    provider: Provider::parse(&provider_tag)?,
                    last_synced_at: parse_opt_ts(row.try_get("last_synced_at")?)?,
                    has_refresh_token: row.try_get::<i64, _>("has_refresh_token")? != 0,
                })
            })
            .collect()
    }

    /// Persist rotated tokens for one account. The row update is atomic, so
    /// access and refresh token never land separately.
    pub async fn update_tokens(&self, account: &Account) -> Result<(), HubError> {
        let access_token = self.codec.encrypt(account.access_token.as_deref())?;
        let refresh_token = self.codec.encrypt(account.refresh_token.as_deref())?;
        let expires_at = account.token_expires_at.map(|t| t.to_rfc3339());

        sqlx::query(
            "UPDATE accounts SET access_token = ?, refresh_token = ?, token_expires_at = ? \
             WHERE id = ?",
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(account.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Move the watermark forward. Only called after a successful listing.
    pub async fn advance_watermark(&self, id: i64, ts: DateTime<Utc>) -> Result<(), HubError> {
        sqlx::query("UPDATE accounts SET last_synced_at = ? WHERE id = ?")
            .bind(ts.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Produce the decrypted in-memory view of a row.
    pub fn decrypt(&self, record: AccountRecord) -> Result<Account, HubError> {
        Ok(Account {
            id: record.id,
            email: record.email,
            provider: record.provider,
            access_token: self.codec.decrypt(record.access_token.as_deref())?,
            refresh_token: self.codec.decrypt(record.refresh_token.as_deref())?,
            client_id: self.codec.decrypt(record.client_id.as_deref())?,
            client_secret: self.codec.decrypt(record.client_secret.as_deref())?,
            token_uri: record.token_uri,
            scopes: record.scopes,
            last_synced_at: record.last_synced_at,
            token_expires_at: record.token_expires_at,
        })
    }

    fn row_to_record(row: SqliteRow) -> Result<AccountRecord, HubError> {
        let provider_tag: String = row.try_get("provider")?;
        let scopes_json: Option<String> = row.try_get("scopes")?;
        let scopes: Option<Vec<String>> = match scopes_json {
            Some(s) => {
                Some(serde_json::from_str(&s).map_err(|e| sqlx::Error::Decode(Box::new(e)))?)
            }
            None => None,
        };

        Ok(AccountRecord {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            provider: Provider::parse(&provider_tag)?,
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            client_id: row.try_get("client_id")?,
            client_secret: row.try_get("client_secret")?,
            token_uri: row.try_get("token_uri")?,
            scopes,
            last_synced_at: parse_opt_ts(row.try_get("last_synced_at")?)?,
            token_expires_at: parse_opt_ts(row.try_get("token_expires_at")?)?,
        })
    }
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, HubError> {
    raw.map(|s| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| HubError::Database(sqlx::Error::Decode(Box::new(e))))
    })
    .transpose()
}
