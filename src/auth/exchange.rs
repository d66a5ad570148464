// Authorization-code exchange against the token endpoint

use reqwest::Client;
use serde_json::Value;

use super::types::{OAuthSettings, TokenExchangeRequest, TokenExchangeResponse};
use crate::error::ApiError;

/// Upstream body as JSON when it parses, raw text otherwise
pub(crate) fn body_as_details(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// Exchange a one-time authorization code for an access token
///
/// Single attempt; any failure becomes `UpstreamAuthError` with the upstream
/// body attached.
pub async fn exchange_code(
    client: &Client,
    settings: &OAuthSettings,
    code: &str,
) -> Result<TokenExchangeResponse, ApiError> {
    tracing::debug!(url = %settings.token_url, "Exchanging authorization code");

    let request = TokenExchangeRequest {
        grant_type: "authorization_code",
        code,
        redirect_uri: &settings.redirect_uri,
    };

    let response = client
        .post(&settings.token_url)
        .basic_auth(&settings.client_id, Some(&settings.client_secret))
        .json(&request)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Token endpoint request failed");
            ApiError::UpstreamAuthError {
                status: None,
                details: Value::String(e.to_string()),
            }
        })?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if !status.is_success() {
        tracing::error!(
            status = status.as_u16(),
            response_body = %text,
            "Token exchange rejected"
        );
        return Err(ApiError::UpstreamAuthError {
            status: Some(status.as_u16()),
            details: body_as_details(text),
        });
    }

    let data: TokenExchangeResponse = serde_json::from_str(&text).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse token response");
        ApiError::UpstreamAuthError {
            status: Some(status.as_u16()),
            details: body_as_details(text.clone()),
        }
    })?;

    if data.access_token.is_empty() {
        return Err(ApiError::UpstreamAuthError {
            status: Some(status.as_u16()),
            details: body_as_details(text),
        });
    }

    Ok(data)
}
