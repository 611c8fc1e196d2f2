use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum HubError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("authorization exchange failed: {0}")]
    AuthExchange(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("file listing failed: {0}")]
    Listing(String),

    #[error("encryption misconfigured: {0}")]
    EncryptionConfig(String),

    #[error("credential codec error: {0}")]
    Crypto(String),

    #[error("missing access token; refresh first")]
    MissingAccessToken,

    #[error("missing email in identity response")]
    MissingEmail,

    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    #[error("OAuth2 server error: {error}")]
    Oauth2Server { error: String },

    #[error("a sync pass is already running")]
    SyncInProgress,

    #[error("database error: {0}")]
    Database(#[from] SqlxError),
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for HubError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => HubError::Oauth2Server {
                error: err.error().to_string(),
            },
            RequestTokenError::Request(req_e) => {
                HubError::Oauth2Token(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => HubError::Json(parse_err.into_inner()),
            RequestTokenError::Other(s) => HubError::Oauth2Token(s),
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            HubError::UnknownProvider(tag) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "UNKNOWN_PROVIDER".to_string(),
                    message: format!("provider '{tag}' is not configured or invalid"),
                },
            ),
            HubError::AuthExchange(_)
            | HubError::Oauth2Token(_)
            | HubError::Oauth2Server { .. }
            | HubError::Json(_)
            | HubError::MissingEmail => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "AUTH_EXCHANGE_FAILED".to_string(),
                    message: "Authentication failed.".to_string(),
                },
            ),
            HubError::SyncInProgress => (
                StatusCode::CONFLICT,
                ApiErrorBody {
                    code: "SYNC_IN_PROGRESS".to_string(),
                    message: "A sync pass is already running.".to_string(),
                },
            ),
            HubError::Database(_)
            | HubError::Crypto(_)
            | HubError::EncryptionConfig(_)
            | HubError::RefreshFailed(_)
            | HubError::Listing(_)
            | HubError::MissingAccessToken => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
            HubError::Reqwest(_) | HubError::UrlParse(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "Upstream service is unavailable.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
