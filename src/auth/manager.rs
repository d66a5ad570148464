use anyhow::Context;
use reqwest::{Client, Url};
use std::sync::Arc;

use super::exchange;
use super::store::CredentialStore;
use super::types::{CredentialRecord, OAuthSettings};
use crate::error::ApiError;

/// Credential manager
/// Drives the OAuth authorization-code flow and owns the user → token mapping
pub struct CredentialManager {
    /// OAuth client registration
    settings: OAuthSettings,

    /// Injected credential persistence
    store: Arc<dyn CredentialStore>,

    /// HTTP client for token exchange requests
    client: Client,
}

impl CredentialManager {
    pub fn new(
        settings: OAuthSettings,
        store: Arc<dyn CredentialStore>,
        request_timeout: u64,
    ) -> anyhow::Result<Self> {
        Url::parse(&settings.authorize_url)
            .with_context(|| format!("Invalid authorize URL: {}", settings.authorize_url))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            settings,
            store,
            client,
        })
    }

    /// Build the authorization URL the user is redirected to
    ///
    /// `state` carries the user id through the redirect round-trip; it is a
    /// correlation value, not an anti-forgery nonce.
    pub fn begin_authorization(&self, user_id: &str) -> Result<Url, ApiError> {
        if user_id.is_empty() {
            return Err(ApiError::InvalidRequest("Missing user_id".to_string()));
        }

        let url = Url::parse_with_params(
            &self.settings.authorize_url,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("response_type", "code"),
                ("owner", self.settings.owner.as_str()),
                ("state", user_id),
            ],
        )
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Invalid authorize URL: {}", e)))?;

        tracing::info!(user_id = %user_id, "Starting Notion authorization");
        Ok(url)
    }

    /// Exchange `code` and persist the resulting credential for `user_id`
    ///
    /// Nothing is written unless the exchange succeeds.
    pub async fn complete_authorization(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<CredentialRecord, ApiError> {
        if code.is_empty() {
            return Err(ApiError::InvalidRequest("Missing code".to_string()));
        }
        if user_id.is_empty() {
            return Err(ApiError::InvalidRequest(
                "Missing state (user_id)".to_string(),
            ));
        }

        let token = exchange::exchange_code(&self.client, &self.settings, code).await?;
        let record = CredentialRecord::from(token);

        self.store.put(user_id, record.clone()).await?;

        tracing::info!(
            user_id = %user_id,
            workspace = record.workspace_name.as_deref().unwrap_or("-"),
            "Token stored for user"
        );
        Ok(record)
    }

    /// Look up the stored access token; `None` means the user never connected
    pub async fn get_credential(&self, user_id: &str) -> Result<Option<String>, ApiError> {
        let record = self.store.get(user_id).await?;
        Ok(record.map(|r| r.access_token))
    }
}
