use crate::connectors::Provider;
use crate::error::HubError;
use crate::server::router::HubState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Cloud Drive Connector Hub" }))
}

/// GET /auth/{provider}/login -> redirect to the provider's consent page.
pub async fn login(
    State(state): State<HubState>,
    Path(provider): Path<String>,
) -> Result<Redirect, HubError> {
    let provider = Provider::parse(&provider)?;
    let connector = state.registry.resolve(provider)?;
    let url = connector.authorization_url()?;
    info!(provider = %provider, "dispatching OAuth redirect");
    Ok(Redirect::temporary(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
}

/// GET /auth/{provider}/callback -> exchange the code and upsert the account.
/// A rejected exchange writes nothing.
pub async fn callback(
    State(state): State<HubState>,
    Path(provider): Path<String>,
    Query(query): Query<AuthCallbackQuery>,
) -> Result<Json<serde_json::Value>, HubError> {
    let provider = Provider::parse(&provider)?;
    let connector = state.registry.resolve(provider)?;
    let code = query
        .code
        .as_deref()
        .ok_or_else(|| HubError::AuthExchange("missing `code` in callback".to_string()))?;

    let bundle = connector.exchange_code(code).await?;
    state.store.upsert(&bundle).await?;
    info!(email = %bundle.email, provider = %provider, "account linked");

    Ok(Json(json!({
        "message": format!("Successfully connected to {provider}"),
        "user": bundle.email,
    })))
}

/// GET /accounts -> linked-account summaries, no token material.
pub async fn accounts(State(state): State<HubState>) -> Result<impl IntoResponse, HubError> {
    let overview = state.store.list_overview().await?;
    Ok(Json(overview))
}

/// GET /config -> providers the server is actually configured for.
pub async fn provider_config(State(state): State<HubState>) -> Json<serde_json::Value> {
    let available = state.registry.available();
    let mode = if available.len() > 1 {
        "multi-provider"
    } else {
        "single-provider"
    };
    Json(json!({
        "available_providers": available,
        "mode": mode,
    }))
}

fn default_source_type() -> String {
    "both".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// "both" (default) for every configured provider, or one provider tag.
    #[serde(default = "default_source_type")]
    pub source_type: String,
}

#[derive(Debug, Serialize)]
pub struct SyncAccepted {
    pub message: String,
    pub target_providers: Vec<Provider>,
}

/// POST /sync -> start a background pass; does not wait for it.
pub async fn trigger_sync(
    State(state): State<HubState>,
    Json(request): Json<SyncRequest>,
) -> Result<impl IntoResponse, HubError> {
    let targets: Vec<Provider> = match request.source_type.as_str() {
        "both" | "all" => state.registry.available(),
        tag => {
            let provider = Provider::parse(tag)?;
            if !state.registry.is_available(provider) {
                return Err(HubError::UnknownProvider(tag.to_string()));
            }
            vec![provider]
        }
    };

    state.sync.trigger(targets.clone())?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SyncAccepted {
            message: "Sync process started in background.".to_string(),
            target_providers: targets,
        }),
    ))
}

/// GET /sync/status -> queryable state of the last/current pass.
pub async fn sync_status(State(state): State<HubState>) -> impl IntoResponse {
    Json(state.sync.status())
}
