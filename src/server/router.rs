use crate::connectors::ConnectorRegistry;
use crate::db::sqlite::AccountStore;
use crate::server::handlers;
use crate::sync::SyncService;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct HubState {
    pub store: AccountStore,
    pub registry: Arc<ConnectorRegistry>,
    pub sync: SyncService,
}

impl HubState {
    pub fn new(store: AccountStore, registry: Arc<ConnectorRegistry>, sync: SyncService) -> Self {
        Self {
            store,
            registry,
            sync,
        }
    }
}

pub fn hub_router(state: HubState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/auth/{provider}/login", get(handlers::login))
        .route("/auth/{provider}/callback", get(handlers::callback))
        .route("/accounts", get(handlers::accounts))
        .route("/config", get(handlers::provider_config))
        .route("/sync", post(handlers::trigger_sync))
        .route("/sync/status", get(handlers::sync_status))
        .with_state(state)
}
