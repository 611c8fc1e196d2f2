//! One sync pass: select accounts, refresh + list per account with bounded
//! parallelism, advance watermarks, aggregate a report. Failure in one
//! account never touches another.

use crate::connectors::{ConnectorRegistry, FileSummary, Provider, RefreshOutcome};
use crate::db::models::AccountRecord;
use crate::db::sqlite::AccountStore;
use crate::sync::AccountLocks;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnknownProvider,
    CredentialError,
    RefreshFailed,
    ListingFailed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Synced { files: Vec<FileSummary> },
    Skipped { reason: SkipReason, detail: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountOutcome {
    pub email: String,
    pub provider: Provider,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl AccountOutcome {
    fn skipped(record: &AccountRecord, reason: SkipReason, detail: impl Into<String>) -> Self {
        Self {
            email: record.email.clone(),
            provider: record.provider,
            status: OutcomeStatus::Skipped {
                reason,
                detail: detail.into(),
            },
        }
    }
}

/// Operator-facing summary of one pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: usize,
    pub skipped: usize,
    pub outcomes: Vec<AccountOutcome>,
}

/// Run one full pass over the accounts matching `filter` (empty = all).
pub async fn run_pass(
    store: &AccountStore,
    registry: &ConnectorRegistry,
    locks: &Arc<AccountLocks>,
    filter: &[Provider],
    concurrency: usize,
) -> SyncReport {
    let started_at = Utc::now();

    let records = match store.list(filter).await {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "account selection failed; aborting pass");
            let finished_at = Utc::now();
            return SyncReport {
                started_at,
                finished_at,
                processed: 0,
                skipped: 0,
                outcomes: Vec::new(),
            };
        }
    };

    info!(count = records.len(), filter = ?filter, "sync pass starting");

    let outcomes: Vec<AccountOutcome> = stream::iter(records)
        .map(|record| {
            let store = store.clone();
            let locks = locks.clone();
            async move { process_account(&store, registry, &locks, record).await }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let processed = outcomes
        .iter()
        .filter(|o| matches!(o.status, OutcomeStatus::Synced { .. }))
        .count();
    let skipped = outcomes.len() - processed;
    let finished_at = Utc::now();

    info!(processed, skipped, "sync pass finished");

    SyncReport {
        started_at,
        finished_at,
        processed,
        skipped,
        outcomes,
    }
}

/// Process one account end to end. Every failure path returns an outcome
/// instead of propagating, which is what isolates accounts from each other.
async fn process_account(
    store: &AccountStore,
    registry: &ConnectorRegistry,
    locks: &AccountLocks,
    record: AccountRecord,
) -> AccountOutcome {
    // Serializes concurrent passes touching the same account; distinct
    // accounts proceed in parallel.
    let _guard = locks.acquire(record.id).await;

    let connector = match registry.resolve(record.provider) {
        Ok(c) => c,
        Err(e) => {
            warn!(email = %record.email, error = %e, "skipping: no connector");
            return AccountOutcome::skipped(&record, SkipReason::UnknownProvider, e.to_string());
        }
    };

    let mut account = match store.decrypt(record.clone()) {
        Ok(account) => account,
        Err(e) => {
            warn!(email = %record.email, error = %e, "skipping: credential decrypt failed");
            return AccountOutcome::skipped(&record, SkipReason::CredentialError, e.to_string());
        }
    };

    // Refresh must be durably persisted before listing is attempted.
    match connector.refresh(&mut account).await {
        RefreshOutcome::Failed(reason) => {
            warn!(email = %account.email, reason = %reason, "skipping: token refresh failed");
            return AccountOutcome::skipped(&record, SkipReason::RefreshFailed, reason);
        }
        RefreshOutcome::Refreshed => {
            if let Err(e) = store.update_tokens(&account).await {
                warn!(email = %account.email, error = %e, "skipping: rotated tokens not persisted");
                return AccountOutcome::skipped(&record, SkipReason::CredentialError, e.to_string());
            }
        }
        RefreshOutcome::Unchanged => {}
    }

    // Watermark advances to the wall-clock time the listing was issued, not
    // the provider's response time.
    let issued_at = Utc::now();
    match connector
        .list_recent_files(&account, account.last_synced_at)
        .await
    {
        Ok(files) => {
            if let Err(e) = store.advance_watermark(account.id, issued_at).await {
                warn!(email = %account.email, error = %e, "watermark update failed");
            }
            info!(email = %account.email, count = files.len(), "listing succeeded");
            AccountOutcome {
                email: account.email,
                provider: account.provider,
                status: OutcomeStatus::Synced { files },
            }
        }
        Err(e) => {
            warn!(email = %account.email, error = %e, "skipping: listing failed");
            AccountOutcome::skipped(&record, SkipReason::ListingFailed, e.to_string())
        }
    }
}
