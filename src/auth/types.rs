// Authentication types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored credential for a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    pub workspace_id: Option<String>,
    pub workspace_name: Option<String>,
    pub bot_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            workspace_id: None,
            workspace_name: None,
            bot_id: None,
            updated_at: Utc::now(),
        }
    }
}

/// OAuth client registration used for the authorization-code flow
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub owner: String,
    pub authorize_url: String,
    pub token_url: String,
}

impl OAuthSettings {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            client_id: config.notion_client_id.clone(),
            client_secret: config.notion_client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            owner: config.oauth_owner.clone(),
            authorize_url: format!("{}/oauth/authorize", config.notion_api_base),
            token_url: format!("{}/oauth/token", config.notion_api_base),
        }
    }
}

/// Token endpoint request body
#[derive(Serialize)]
pub struct TokenExchangeRequest<'a> {
    pub grant_type: &'static str,
    pub code: &'a str,
    pub redirect_uri: &'a str,
}

/// Token endpoint response body
#[derive(Debug, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub workspace_id: Option<String>,
    pub workspace_name: Option<String>,
    pub bot_id: Option<String>,
}

impl From<TokenExchangeResponse> for CredentialRecord {
    fn from(resp: TokenExchangeResponse) -> Self {
        Self {
            access_token: resp.access_token,
            workspace_id: resp.workspace_id,
            workspace_name: resp.workspace_name,
            bot_id: resp.bot_id,
            updated_at: Utc::now(),
        }
    }
}
