use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Duration, Utc};
use drivehub::connectors::google::{GoogleConnector, GoogleEndpoints};
use drivehub::connectors::onedrive::{OneDriveConnector, OneDriveEndpoints};
use drivehub::connectors::{Connector, ConnectorRegistry, CredentialBundle, Provider};
use drivehub::crypto::CredentialCodec;
use drivehub::db::AccountStore;
use drivehub::sync::worker::run_pass;
use drivehub::sync::{AccountLocks, OutcomeStatus, SkipReason};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn open_store(dir: &TempDir) -> AccountStore {
    let codec = Arc::new(CredentialCodec::new(&B64.encode([3u8; 32])).unwrap());
    let url = format!("sqlite:{}/accounts.sqlite", dir.path().display());
    drivehub::db::open(&url, codec).await.unwrap()
}

fn google_connector(server: &MockServer) -> Box<dyn Connector> {
    let endpoints = GoogleEndpoints {
        auth_url: format!("{}/auth", server.uri()),
        token_url: format!("{}/token", server.uri()),
        userinfo_url: format!("{}/userinfo", server.uri()),
        files_url: format!("{}/files", server.uri()),
    };
    Box::new(GoogleConnector::with_endpoints(
        "client-id".to_string(),
        "client-secret".to_string(),
        Url::parse("http://localhost:8000/auth/google/callback").unwrap(),
        endpoints,
        reqwest::Client::new(),
    ))
}

fn onedrive_connector(server: &MockServer) -> Box<dyn Connector> {
    let endpoints = OneDriveEndpoints {
        authority: format!("{}/common", server.uri()),
        graph_base: format!("{}/graph/v1.0", server.uri()),
    };
    Box::new(OneDriveConnector::with_endpoints(
        "client-id".to_string(),
        "client-secret".to_string(),
        Url::parse("http://localhost:8000/auth/onedrive/callback").unwrap(),
        endpoints,
        reqwest::Client::new(),
    ))
}

fn google_bundle(
    server: &MockServer,
    email: &str,
    expires_at: Option<DateTime<Utc>>,
    refresh_token: Option<&str>,
) -> CredentialBundle {
    CredentialBundle {
        provider: Provider::Google,
        email: email.to_string(),
        access_token: "stored-access-token".to_string(),
        refresh_token: refresh_token.map(|t| t.to_string()),
        token_uri: format!("{}/token", server.uri()),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        scopes: vec!["https://www.googleapis.com/auth/drive.readonly".to_string()],
        expires_at,
    }
}

fn token_ok_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "rotated-access-token",
        "token_type": "Bearer",
        "expires_in": 3600,
        "refresh_token": "rotated-refresh-token",
    }))
}

fn drive_files(files: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "files": files }))
}

#[tokio::test]
async fn failed_refresh_skips_account_without_stopping_the_pass() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    // Provider rejects the refresh token outright.
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(drive_files(json!([
            { "id": "f1", "name": "report.txt", "modifiedTime": "2024-05-01T11:50:00.000Z" }
        ])))
        .mount(&server)
        .await;

    let expired = Utc::now() - Duration::hours(1);
    let valid = Utc::now() + Duration::hours(1);
    store
        .upsert(&google_bundle(&server, "broken@example.com", Some(expired), Some("rt-a")))
        .await
        .unwrap();
    store
        .upsert(&google_bundle(&server, "healthy@example.com", Some(valid), Some("rt-b")))
        .await
        .unwrap();

    let registry = ConnectorRegistry::new(vec![google_connector(&server)]);
    let locks = Arc::new(AccountLocks::default());
    let report = run_pass(&store, &registry, &locks, &[], 4).await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 1);

    let broken = report
        .outcomes
        .iter()
        .find(|o| o.email == "broken@example.com")
        .unwrap();
    assert!(matches!(
        broken.status,
        OutcomeStatus::Skipped { reason: SkipReason::RefreshFailed, .. }
    ));

    let healthy = report
        .outcomes
        .iter()
        .find(|o| o.email == "healthy@example.com")
        .unwrap();
    match &healthy.status {
        OutcomeStatus::Synced { files } => {
            assert_eq!(files.len(), 1);
            assert_eq!(files[0].name, "report.txt");
        }
        other => panic!("expected healthy account synced, got {other:?}"),
    }

    // Watermark rules: untouched on failure, advanced on success.
    let broken_row = store.get_by_email("broken@example.com").await.unwrap().unwrap();
    assert_eq!(broken_row.last_synced_at, None);
    let healthy_row = store.get_by_email("healthy@example.com").await.unwrap().unwrap();
    assert!(healthy_row.last_synced_at.is_some());
}

#[tokio::test]
async fn empty_listing_still_advances_the_watermark() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(drive_files(json!([])))
        .mount(&server)
        .await;

    let valid = Utc::now() + Duration::hours(1);
    store
        .upsert(&google_bundle(&server, "quiet@example.com", Some(valid), Some("rt")))
        .await
        .unwrap();

    let registry = ConnectorRegistry::new(vec![google_connector(&server)]);
    let locks = Arc::new(AccountLocks::default());
    let before = Utc::now();
    let report = run_pass(&store, &registry, &locks, &[], 4).await;
    let after = Utc::now();

    assert_eq!(report.processed, 1);
    let row = store.get_by_email("quiet@example.com").await.unwrap().unwrap();
    let mark = row.last_synced_at.unwrap();
    assert!(mark >= before && mark <= after);
}

#[tokio::test]
async fn listing_failure_leaves_the_watermark_untouched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let valid = Utc::now() + Duration::hours(1);
    store
        .upsert(&google_bundle(&server, "user@example.com", Some(valid), Some("rt")))
        .await
        .unwrap();

    let registry = ConnectorRegistry::new(vec![google_connector(&server)]);
    let locks = Arc::new(AccountLocks::default());
    let report = run_pass(&store, &registry, &locks, &[], 4).await;

    assert_eq!(report.processed, 0);
    assert!(matches!(
        report.outcomes[0].status,
        OutcomeStatus::Skipped { reason: SkipReason::ListingFailed, .. }
    ));
    let row = store.get_by_email("user@example.com").await.unwrap().unwrap();
    assert_eq!(row.last_synced_at, None);
}

#[tokio::test]
async fn first_sync_queries_with_the_default_lookback_window() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(drive_files(json!([])))
        .mount(&server)
        .await;

    let valid = Utc::now() + Duration::hours(1);
    store
        .upsert(&google_bundle(&server, "fresh@example.com", Some(valid), Some("rt")))
        .await
        .unwrap();

    let registry = ConnectorRegistry::new(vec![google_connector(&server)]);
    let locks = Arc::new(AccountLocks::default());
    let before = Utc::now();
    run_pass(&store, &registry, &locks, &[], 4).await;
    let after = Utc::now();

    let requests = server.received_requests().await.unwrap();
    let listing = requests
        .iter()
        .find(|r| r.url.path() == "/files")
        .expect("no listing request recorded");
    let q = listing
        .url
        .query_pairs()
        .find(|(k, _)| k == "q")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let start = q
        .split('\'')
        .nth(1)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .expect("listing query carries no timestamp");

    // 15 minutes before "now", not an unbounded filter.
    let lookback = Duration::minutes(15);
    assert!(start >= before - lookback - Duration::seconds(2));
    assert!(start <= after - lookback + Duration::seconds(2));
}

#[tokio::test]
async fn rotated_tokens_are_persisted_and_used_for_listing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_ok_response())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(drive_files(json!([])))
        .mount(&server)
        .await;

    let expired = Utc::now() - Duration::hours(1);
    store
        .upsert(&google_bundle(&server, "stale@example.com", Some(expired), Some("rt")))
        .await
        .unwrap();

    let registry = ConnectorRegistry::new(vec![google_connector(&server)]);
    let locks = Arc::new(AccountLocks::default());
    let report = run_pass(&store, &registry, &locks, &[], 4).await;
    assert_eq!(report.processed, 1);

    // The rotated pair landed in storage.
    let record = store.get_by_email("stale@example.com").await.unwrap().unwrap();
    let account = store.decrypt(record).unwrap();
    assert_eq!(account.access_token.as_deref(), Some("rotated-access-token"));
    assert_eq!(account.refresh_token.as_deref(), Some("rotated-refresh-token"));

    // And the listing call carried the fresh token.
    let requests = server.received_requests().await.unwrap();
    let listing = requests.iter().find(|r| r.url.path() == "/files").unwrap();
    let auth = listing.headers.get("authorization").unwrap();
    assert_eq!(auth.to_str().unwrap(), "Bearer rotated-access-token");
}

#[tokio::test]
async fn onedrive_listing_uses_greater_or_equal_filter() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .respond_with(token_ok_response())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graph/v1.0/me/drive/root/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "i1", "name": "notes.docx", "lastModifiedDateTime": "2024-05-01T11:50:00Z" }
            ]
        })))
        .mount(&server)
        .await;

    store
        .upsert(&CredentialBundle {
            provider: Provider::Onedrive,
            email: "od@example.com".to_string(),
            access_token: "stored-access-token".to_string(),
            refresh_token: Some("rt".to_string()),
            token_uri: format!("{}/common", server.uri()),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            scopes: vec!["Files.Read.All".to_string()],
            expires_at: None,
        })
        .await
        .unwrap();

    let registry = ConnectorRegistry::new(vec![onedrive_connector(&server)]);
    let locks = Arc::new(AccountLocks::default());
    let report = run_pass(&store, &registry, &locks, &[Provider::Onedrive], 4).await;

    assert_eq!(report.processed, 1);
    match &report.outcomes[0].status {
        OutcomeStatus::Synced { files } => assert_eq!(files[0].name, "notes.docx"),
        other => panic!("expected synced, got {other:?}"),
    }

    let requests = server.received_requests().await.unwrap();
    let listing = requests
        .iter()
        .find(|r| r.url.path() == "/graph/v1.0/me/drive/root/children")
        .unwrap();
    let filter = listing
        .url
        .query_pairs()
        .find(|(k, _)| k == "$filter")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert!(filter.starts_with("lastModifiedDateTime ge "));
}

#[tokio::test]
async fn accounts_outside_the_provider_filter_are_not_selected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let valid = Utc::now() + Duration::hours(1);
    store
        .upsert(&google_bundle(&server, "g@example.com", Some(valid), Some("rt")))
        .await
        .unwrap();

    let registry = ConnectorRegistry::new(vec![google_connector(&server)]);
    let locks = Arc::new(AccountLocks::default());
    let report = run_pass(&store, &registry, &locks, &[Provider::Onedrive], 4).await;

    assert!(report.outcomes.is_empty());
    // No provider traffic at all for filtered-out accounts.
    assert!(server.received_requests().await.unwrap().is_empty());
}
