//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and the decrypted view
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: the store itself, codec applied at the row boundary

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{Account, AccountOverview, AccountRecord};
pub use schema::SQLITE_INIT;
pub use sqlite::{AccountStore, SqlitePool};

use crate::crypto::CredentialCodec;
use crate::error::HubError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

/// Open (creating if missing) the database and bootstrap the schema.
pub async fn open(database_url: &str, codec: Arc<CredentialCodec>) -> Result<AccountStore, HubError> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
    let store = AccountStore::new(pool, codec);
    store.init_schema().await?;
    Ok(store)
}
