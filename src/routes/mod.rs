use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    middleware::{self as axum_middleware},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::CredentialManager;
use crate::dispatch::{ActionRequest, Dispatcher};
use crate::error::ApiError;
use crate::middleware;

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub proxy_api_key: Option<String>,
    pub credentials: Arc<CredentialManager>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Health check routes (no authentication required)
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// OAuth connect flow routes
///
/// Driven by the user's browser, so never behind the proxy API key.
pub fn oauth_routes(state: AppState) -> Router {
    Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/notion/connect", get(authorize_handler))
        .route("/oauth/callback", get(callback_handler))
        .with_state(state)
}

/// Action dispatch routes (proxy API key when configured)
pub fn query_routes(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/notion/query", post(query_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Notion Gateway is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub user_id: Option<String>,
}

/// GET /authorize - Redirect the user to Notion's consent screen
async fn authorize_handler(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Redirect, ApiError> {
    let user_id = params.user_id.unwrap_or_default();
    let url = state.credentials.begin_authorization(&user_id)?;
    Ok(Redirect::to(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn callback_page(status: StatusCode, message: &str) -> Response {
    (status, Html(format!("<h2>{}</h2>", message))).into_response()
}

/// GET /oauth/callback - Exchange the code and store the credential
///
/// Renders a page for the human who just went through the consent screen.
async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "Notion authorization was not granted");
        return callback_page(
            StatusCode::BAD_REQUEST,
            "Authorization was not granted. You may close this window and try again.",
        );
    }

    let code = params.code.unwrap_or_default();
    let user_id = params.state.unwrap_or_default();

    match state
        .credentials
        .complete_authorization(&code, &user_id)
        .await
    {
        Ok(_) => callback_page(
            StatusCode::OK,
            "Connected! You may now return to your app.",
        ),
        Err(ApiError::InvalidRequest(msg)) => {
            tracing::warn!("Invalid OAuth callback: {}", msg);
            callback_page(
                StatusCode::BAD_REQUEST,
                "OAuth Error: the callback is missing its code or state.",
            )
        }
        Err(e) => {
            tracing::error!(
                user_id = %user_id,
                details = %e.to_envelope(),
                "OAuth error"
            );
            callback_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "OAuth Error: Could not fetch token",
            )
        }
    }
}

/// POST /query - Dispatch an action on behalf of a connected user
async fn query_handler(
    State(state): State<AppState>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) =
        body.map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;

    let result = state.dispatcher.handle(request).await?;
    Ok(Json(result))
}

#[cfg(test)]
pub(crate) fn test_state(api_base: &str) -> AppState {
    use crate::auth::{MemoryCredentialStore, OAuthSettings};
    use crate::http_client::NotionHttpClient;

    let config = crate::config::test_config(api_base);
    let credentials = Arc::new(
        CredentialManager::new(
            OAuthSettings::from_config(&config),
            Arc::new(MemoryCredentialStore::new()),
            10,
        )
        .unwrap(),
    );
    let http_client = Arc::new(
        NotionHttpClient::new(api_base, &config.notion_version, 20, 5, 10).unwrap(),
    );

    AppState {
        proxy_api_key: None,
        credentials: credentials.clone(),
        dispatcher: Arc::new(Dispatcher::new(credentials, http_client)),
    }
}
