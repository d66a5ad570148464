// Action dispatch
// Maps (user, action, parameters) onto authenticated Notion API calls

pub mod actions;

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::auth::CredentialManager;
use crate::error::ApiError;
use crate::http_client::NotionHttpClient;

pub use actions::{lookup, ActionSpec, Parameters, ResultShape, ACTIONS};

/// Body of `POST /query`
///
/// Fields are optional so that shape errors surface as `invalid_request`
/// rather than as deserialization rejections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

pub struct Dispatcher {
    credentials: Arc<CredentialManager>,
    http_client: Arc<NotionHttpClient>,
}

impl Dispatcher {
    pub fn new(credentials: Arc<CredentialManager>, http_client: Arc<NotionHttpClient>) -> Self {
        Self {
            credentials,
            http_client,
        }
    }

    /// Dispatch a raw `POST /query` body
    pub async fn handle(&self, request: ActionRequest) -> Result<Value, ApiError> {
        let user_id = request
            .user_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::InvalidRequest("Missing user_id".to_string()))?;
        let action = request.action.unwrap_or_default();
        let parameters = request.parameters.unwrap_or(Value::Null);

        self.dispatch(&user_id, &action, &parameters).await
    }

    /// Resolve the credential, validate, execute, and shape the result
    ///
    /// The credential check comes first and every validation happens before
    /// any upstream traffic.
    pub async fn dispatch(
        &self,
        user_id: &str,
        action: &str,
        parameters: &Value,
    ) -> Result<Value, ApiError> {
        tracing::info!(user_id = %user_id, action = %action, "Received request");

        let Some(access_token) = self.credentials.get_credential(user_id).await? else {
            tracing::warn!(user_id = %user_id, "No token found for user");
            return Err(ApiError::NotConnected(user_id.to_string()));
        };

        if action.is_empty() {
            return Err(ApiError::InvalidRequest("Missing action".to_string()));
        }
        let spec = lookup(action).ok_or_else(|| {
            tracing::warn!(action = %action, "Unsupported action");
            ApiError::UnsupportedAction(action.to_string())
        })?;

        let empty = Parameters::new();
        let parameters = match parameters {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(ApiError::InvalidRequest(
                    "parameters must be a JSON object".to_string(),
                ))
            }
        };

        let missing = spec.missing_parameters(parameters);
        if !missing.is_empty() {
            return Err(ApiError::InvalidRequest(format!(
                "Missing {}",
                missing.join(", ")
            )));
        }

        let call = (spec.build)(parameters)?;

        let body = self
            .http_client
            .send(&access_token, &call)
            .await
            .inspect_err(|e| {
                tracing::error!(action = %action, error = %e, "Notion API error on action");
            })?;

        Ok(spec.shape_result(body))
    }
}
