//! Sync orchestration: fire-and-forget triggering plus a queryable status,
//! and the per-account locking that keeps concurrent passes from interleaving
//! token updates on the same row.

pub mod worker;

pub use worker::{AccountOutcome, OutcomeStatus, SkipReason, SyncReport};

use crate::connectors::{ConnectorRegistry, Provider};
use crate::db::sqlite::AccountStore;
use crate::error::HubError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

/// Per-account-id async locks. The map itself is guarded by a short-lived
/// std mutex; the per-id lock is held across the account's network calls.
#[derive(Default)]
pub struct AccountLocks {
    inner: StdMutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub async fn acquire(&self, id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("account lock map poisoned");
            map.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Running { started_at: DateTime<Utc> },
    Completed { report: SyncReport },
}

/// Owns sync execution. `trigger` hands the pass to a background task and
/// returns immediately; callers observe progress through `status`.
#[derive(Clone)]
pub struct SyncService {
    store: AccountStore,
    registry: Arc<ConnectorRegistry>,
    locks: Arc<AccountLocks>,
    status: Arc<StdMutex<SyncStatus>>,
    concurrency: usize,
}

impl SyncService {
    pub fn new(store: AccountStore, registry: Arc<ConnectorRegistry>, concurrency: usize) -> Self {
        Self {
            store,
            registry,
            locks: Arc::new(AccountLocks::default()),
            status: Arc::new(StdMutex::new(SyncStatus::Idle)),
            concurrency,
        }
    }

    /// Start a pass for the given provider filter (empty = all). Rejects the
    /// trigger while another pass is still running.
    pub fn trigger(&self, filter: Vec<Provider>) -> Result<(), HubError> {
        {
            let mut status = self.status.lock().expect("sync status poisoned");
            if matches!(*status, SyncStatus::Running { .. }) {
                return Err(HubError::SyncInProgress);
            }
            *status = SyncStatus::Running {
                started_at: Utc::now(),
            };
        }

        let service = self.clone();
        tokio::spawn(async move {
            info!(filter = ?filter, "background sync pass dispatched");
            let report = worker::run_pass(
                &service.store,
                &service.registry,
                &service.locks,
                &filter,
                service.concurrency,
            )
            .await;
            let mut status = service.status.lock().expect("sync status poisoned");
            *status = SyncStatus::Completed { report };
        });
        Ok(())
    }

    pub fn status(&self) -> SyncStatus {
        self.status.lock().expect("sync status poisoned").clone()
    }
}
