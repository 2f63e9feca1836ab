//! Single egress point for the task-management service.
//!
//! Every request is paced by the [`RateLimiter`], authenticated according to
//! its [`ApiScope`], and its response classified: 2xx bodies are returned,
//! 429 is reported as [`GatewayResponse::Throttled`] so the caller can decide
//! to retry, and every other status is a fatal [`InfraError::Http`].

use crate::domain::models::Credential;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::rate_limiter::RateLimiter;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://api.usemotion.com/v1";
pub const DEFAULT_INTERNAL_BASE_URL: &str = "https://internal.usemotion.com";
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiScope {
    /// Documented API, authenticated with a static API key header.
    Public,
    /// Internal API, authenticated with a short-lived bearer credential.
    Internal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub scope: ApiScope,
    collection_key: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            scope: ApiScope::Public,
            collection_key: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_query(key, value);
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn internal(mut self) -> Self {
        self.scope = ApiScope::Internal;
        self
    }

    /// Overrides the key under which a paginated response lists its items.
    pub fn collection(mut self, key: impl Into<String>) -> Self {
        self.collection_key = Some(key.into());
        self
    }

    pub fn set_query(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.query.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.query.push((key, value)),
        }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Item key of a paginated response; defaults to the last path segment
    /// (`/tasks` lists its items under `tasks`).
    pub fn collection_key(&self) -> String {
        if let Some(key) = self.collection_key.as_deref() {
            return key.to_string();
        }
        self.path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .next_back()
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayResponse {
    Success(serde_json::Value),
    Throttled { retry_after: Duration },
}

/// Executes one request attempt. Implemented by [`HttpGateway`]; the
/// paginated client only sees this seam.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<GatewayResponse, InfraError>;
}

/// Supplies a currently valid bearer credential for internal endpoints.
#[async_trait]
pub trait BearerCredentials: Send + Sync {
    async fn bearer_credential(&self) -> Result<Credential, InfraError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub public_base_url: String,
    pub internal_base_url: String,
    pub api_key: String,
    pub default_retry_after: Duration,
}

impl GatewayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            internal_base_url: DEFAULT_INTERNAL_BASE_URL.to_string(),
            api_key: api_key.into(),
            default_retry_after: DEFAULT_RETRY_AFTER,
        }
    }

    pub fn with_base_urls(
        mut self,
        public_base_url: impl Into<String>,
        internal_base_url: impl Into<String>,
    ) -> Self {
        self.public_base_url = public_base_url.into();
        self.internal_base_url = internal_base_url.into();
        self
    }

    pub fn with_default_retry_after(mut self, default_retry_after: Duration) -> Self {
        self.default_retry_after = default_retry_after;
        self
    }
}

pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
    rate_limiter: Arc<RateLimiter>,
    credentials: Arc<dyn BearerCredentials>,
}

impl HttpGateway {
    pub fn new(
        config: GatewayConfig,
        rate_limiter: Arc<RateLimiter>,
        credentials: Arc<dyn BearerCredentials>,
    ) -> Self {
        Self {
            client: Client::new(),
            config,
            rate_limiter,
            credentials,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn endpoint_url(&self, request: &ApiRequest) -> Result<Url, InfraError> {
        let base = match request.scope {
            ApiScope::Public => &self.config.public_base_url,
            ApiScope::Internal => &self.config.internal_base_url,
        };
        let mut url = Url::parse(base)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid api base url '{base}': {error}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig(format!("api base url '{base}' cannot be a base"))
            })?;
            segments.pop_if_empty();
            for segment in request.path.split('/').filter(|segment| !segment.is_empty()) {
                segments.push(segment);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl ApiTransport for HttpGateway {
    async fn execute(&self, request: &ApiRequest) -> Result<GatewayResponse, InfraError> {
        self.rate_limiter.acquire().await;

        let url = self.endpoint_url(request)?;
        debug!(
            method = %request.method,
            path = %request.path,
            query = ?request.query,
            scope = ?request.scope,
            "outgoing request"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header(ACCEPT, "application/json");
        builder = match request.scope {
            ApiScope::Public => builder.header(API_KEY_HEADER, self.config.api_key.as_str()),
            ApiScope::Internal => {
                let credential = self.credentials.bearer_credential().await?;
                builder.bearer_auth(credential.as_str())
            }
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| InfraError::Network {
            endpoint: request.path.clone(),
            message: error.to_string(),
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after =
                parse_retry_after(response.headers()).unwrap_or(self.config.default_retry_after);
            return Ok(GatewayResponse::Throttled { retry_after });
        }

        let body = response.text().await.map_err(|error| InfraError::Network {
            endpoint: request.path.clone(),
            message: format!("failed reading response body: {error}"),
        })?;

        if !status.is_success() {
            return Err(InfraError::Http {
                method: request.method.to_string(),
                endpoint: request.path.clone(),
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(GatewayResponse::Success(serde_json::Value::Null));
        }
        let value = serde_json::from_str(&body).map_err(|error| InfraError::Payload {
            endpoint: request.path.clone(),
            message: format!("{error}; body={body}"),
        })?;
        Ok(GatewayResponse::Success(value))
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(Duration::from_secs_f64)
}
