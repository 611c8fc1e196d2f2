//! SQL DDL for initializing account storage.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema:
/// - one row per linked account, `email` UNIQUE (a re-link for the same email
///   overwrites the row, it never creates a second one)
/// - token/client columns hold AES-GCM ciphertext, never plaintext
/// - timestamps stored as RFC3339 text
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    provider TEXT NOT NULL,
    access_token TEXT NULL,
    refresh_token TEXT NULL,
    client_id TEXT NULL,
    client_secret TEXT NULL,
    token_uri TEXT NULL,
    scopes TEXT NULL, -- JSON array, serialized as text
    last_synced_at TEXT NULL,
    token_expires_at TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_accounts_provider ON accounts(provider);
"#;
