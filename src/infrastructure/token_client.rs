use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;

#[derive(Debug, Clone)]
pub struct TokenIssueRequest {
    pub token_endpoint: String,
    pub shared_key: Option<String>,
}

#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Returns the raw bearer string; any failure is an `InfraError::Auth`.
    async fn issue_token(&self, request: TokenIssueRequest) -> Result<String, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTokenIssuer {
    client: Client,
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponsePayload {
    access_token: Option<String>,
}

impl ReqwestTokenIssuer {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenIssuer for ReqwestTokenIssuer {
    async fn issue_token(&self, request: TokenIssueRequest) -> Result<String, InfraError> {
        let shared_key = request
            .shared_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| InfraError::Auth("token issuing key is not configured".to_string()))?;

        let response = self
            .client
            .get(&request.token_endpoint)
            .query(&[("key", shared_key)])
            .send()
            .await
            .map_err(|error| InfraError::Auth(format!("token request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Auth(format!("failed reading token response: {error}")))?;

        if !status.is_success() {
            return Err(InfraError::Auth(format!(
                "token endpoint error: http {}",
                status.as_u16()
            )));
        }

        let parsed = serde_json::from_str::<TokenResponsePayload>(&body).map_err(|error| {
            InfraError::Auth(format!("invalid token response payload: {error}"))
        })?;

        parsed
            .access_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| InfraError::Auth("token response did not include access_token".to_string()))
    }
}
