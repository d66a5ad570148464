use anyhow::{Context, Result};
use reqwest::{Client, Method, Url};
use serde_json::Value;
use std::time::Duration;

use crate::auth::body_as_details;
use crate::error::ApiError;

/// A single call against the Notion API, relative to the API base
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamCall {
    pub method: Method,
    /// Path segments, each percent-encoded on the way out
    pub path: Vec<String>,
    pub body: Value,
}

impl UpstreamCall {
    pub fn new(method: Method, path: &[&str], body: Value) -> Self {
        Self {
            method,
            path: path.iter().map(|s| s.to_string()).collect(),
            body,
        }
    }
}

/// HTTP client for the Notion API
///
/// Every call is executed exactly once; failures are surfaced immediately.
pub struct NotionHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// API base, e.g. `https://api.notion.com/v1`
    api_base: Url,

    /// Pinned `Notion-Version` header value
    notion_version: String,
}

impl NotionHttpClient {
    pub fn new(
        api_base: &str,
        notion_version: &str,
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let api_base = Url::parse(api_base)
            .with_context(|| format!("Invalid Notion API base URL: {}", api_base))?;

        Ok(Self {
            client,
            api_base,
            notion_version: notion_version.to_string(),
        })
    }

    /// Resolve a call's path segments against the API base
    pub fn url_for(&self, call: &UpstreamCall) -> Result<Url, ApiError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::Internal(anyhow::anyhow!(
                    "Notion API base cannot carry a path: {}",
                    self.api_base
                ))
            })?
            .pop_if_empty()
            .extend(&call.path);
        Ok(url)
    }

    /// Execute `call` with the user's bearer token and return the JSON body
    pub async fn send(&self, access_token: &str, call: &UpstreamCall) -> Result<Value, ApiError> {
        let url = self.url_for(call)?;

        tracing::debug!(
            method = %call.method,
            url = %url,
            "Sending Notion API request"
        );

        let result = self
            .client
            .request(call.method.clone(), url.clone())
            .bearer_auth(access_token)
            .header("Notion-Version", &self.notion_version)
            .header("Content-Type", "application/json")
            .json(&call.body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else if e.is_request() {
                    "request_error"
                } else {
                    "unknown"
                };

                tracing::error!(
                    error_kind = error_kind,
                    error = %e,
                    url = %url,
                    "Notion API request error"
                );

                return Err(ApiError::UpstreamApiError {
                    status: None,
                    details: Value::String(format!("{} (kind: {})", e, error_kind)),
                });
            }
        };

        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError::UpstreamApiError {
            status: Some(status.as_u16()),
            details: Value::String(format!("Failed to read response body: {}", e)),
        })?;

        if !status.is_success() {
            tracing::error!(
                status = status.as_u16(),
                url = %url,
                response_body = %text,
                "Notion API request failed with error response"
            );
            return Err(ApiError::UpstreamApiError {
                status: Some(status.as_u16()),
                details: body_as_details(text),
            });
        }

        tracing::debug!(status = %status, "Notion API request successful");

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(error = %e, url = %url, "Notion API returned non-JSON body");
            ApiError::UpstreamApiError {
                status: Some(status.as_u16()),
                details: Value::String(text),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> NotionHttpClient {
        NotionHttpClient::new("https://api.notion.com/v1", "2022-06-28", 20, 5, 10).unwrap()
    }

    #[test]
    fn test_url_for_joins_segments() {
        let call = UpstreamCall::new(Method::POST, &["databases", "abc123", "query"], json!({}));
        let url = client().url_for(&call).unwrap();
        assert_eq!(url.as_str(), "https://api.notion.com/v1/databases/abc123/query");
    }

    #[test]
    fn test_url_for_encodes_ids() {
        let call = UpstreamCall::new(Method::PATCH, &["pages", "a/b?c"], json!({}));
        let url = client().url_for(&call).unwrap();
        assert_eq!(url.as_str(), "https://api.notion.com/v1/pages/a%2Fb%3Fc");
    }

    #[test]
    fn test_url_for_tolerates_trailing_slash() {
        let client =
            NotionHttpClient::new("https://api.notion.com/v1/", "2022-06-28", 20, 5, 10).unwrap();
        let call = UpstreamCall::new(Method::POST, &["search"], json!({}));
        assert_eq!(
            client.url_for(&call).unwrap().as_str(),
            "https://api.notion.com/v1/search"
        );
    }

    #[tokio::test]
    async fn test_send_attaches_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/search")
            .match_header("authorization", "Bearer secret_token")
            .match_header("notion-version", "2022-06-28")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"object":"list","results":[]}"#)
            .expect(1)
            .create_async()
            .await;

        let client =
            NotionHttpClient::new(&format!("{}/v1", server.url()), "2022-06-28", 20, 5, 10)
                .unwrap();
        let call = UpstreamCall::new(Method::POST, &["search"], json!({}));
        let body = client.send("secret_token", &call).await.unwrap();

        mock.assert_async().await;
        assert_eq!(body["object"], "list");
    }

    #[tokio::test]
    async fn test_send_does_not_retry_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/search")
            .with_status(503)
            .with_body("upstream unavailable")
            .expect(1)
            .create_async()
            .await;

        let client =
            NotionHttpClient::new(&format!("{}/v1", server.url()), "2022-06-28", 20, 5, 10)
                .unwrap();
        let call = UpstreamCall::new(Method::POST, &["search"], json!({}));
        let err = client.send("t", &call).await.unwrap_err();

        mock.assert_async().await;
        match err {
            ApiError::UpstreamApiError { status, details } => {
                assert_eq!(status, Some(503));
                assert_eq!(details, json!("upstream unavailable"));
            }
            other => panic!("Expected UpstreamApiError, got {:?}", other),
        }
    }
}
