//! Cursor pagination and 429 backoff over an [`ApiTransport`].

use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::http_gateway::{ApiRequest, ApiTransport, GatewayResponse};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
const CURSOR_PARAM: &str = "cursor";
const NEXT_CURSOR_POINTER: &str = "/meta/nextCursor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Page budget for paginated GETs; `None` follows cursors to the end.
    pub limit: Option<usize>,
    pub max_retries: u32,
    /// The endpoint answers with a bare array and no continuation.
    pub direct_list: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            limit: None,
            max_retries: DEFAULT_MAX_RETRIES,
            direct_list: false,
        }
    }
}

impl RequestOptions {
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn direct_list(mut self) -> Self {
        self.direct_list = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiResult {
    Object(Value),
    List(Vec<Value>),
}

impl ApiResult {
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Self::List(items) => items,
            Self::Object(Value::Array(items)) => items,
            Self::Object(Value::Null) => Vec::new(),
            Self::Object(other) => vec![other],
        }
    }

    pub fn into_object(self) -> Value {
        match self {
            Self::Object(value) => value,
            Self::List(items) => Value::Array(items),
        }
    }
}

pub struct PaginatedClient {
    transport: Arc<dyn ApiTransport>,
    clock: Arc<dyn Clock>,
    default_max_retries: u32,
    retries: AtomicU64,
}

impl PaginatedClient {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self {
            transport,
            clock: Arc::new(SystemClock),
            default_max_retries: DEFAULT_MAX_RETRIES,
            retries: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Options carrying this client's configured retry budget.
    pub fn options(&self) -> RequestOptions {
        RequestOptions::default().with_max_retries(self.default_max_retries)
    }

    /// Number of 429 retries performed over the client's lifetime.
    pub fn total_retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Non-GET calls return their parsed body as one object. GETs are either
    /// a direct array or a cursor-paginated listing whose pages are
    /// concatenated in server order.
    pub async fn request(
        &self,
        request: ApiRequest,
        options: RequestOptions,
    ) -> Result<ApiResult, InfraError> {
        if request.method != Method::GET {
            let body = self.send_with_retry(&request, &options).await?;
            return Ok(ApiResult::Object(body));
        }

        if options.direct_list {
            let body = self.send_with_retry(&request, &options).await?;
            return Ok(ApiResult::List(match body {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => {
                    warn!(
                        endpoint = %request.path,
                        kind = json_kind(&other),
                        "expected a bare array, treating as empty"
                    );
                    Vec::new()
                }
            }));
        }

        self.paginate(request, &options).await.map(ApiResult::List)
    }

    async fn paginate(
        &self,
        mut request: ApiRequest,
        options: &RequestOptions,
    ) -> Result<Vec<Value>, InfraError> {
        let key = request.collection_key();
        let mut items = Vec::new();
        let mut pages = 0usize;

        loop {
            let mut body = self.send_with_retry(&request, options).await?;
            pages += 1;

            match body.get_mut(key.as_str()) {
                Some(Value::Array(page)) => items.append(page),
                _ => warn!(endpoint = %request.path, key = %key, "page has no item list"),
            }

            let Some(cursor) = body
                .pointer(NEXT_CURSOR_POINTER)
                .and_then(Value::as_str)
                .filter(|cursor| !cursor.is_empty())
                .map(str::to_string)
            else {
                break;
            };
            if options.limit.is_some_and(|limit| pages >= limit) {
                break;
            }
            request.set_query(CURSOR_PARAM, cursor);
        }

        Ok(items)
    }

    async fn send_with_retry(
        &self,
        request: &ApiRequest,
        options: &RequestOptions,
    ) -> Result<Value, InfraError> {
        let mut attempt = 0u32;
        loop {
            match self.transport.execute(request).await? {
                GatewayResponse::Success(body) => return Ok(body),
                GatewayResponse::Throttled { retry_after } => {
                    if attempt >= options.max_retries {
                        return Err(InfraError::RateLimited {
                            method: request.method.to_string(),
                            endpoint: request.path.clone(),
                            retry_after,
                        });
                    }
                    attempt += 1;
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        endpoint = %request.path,
                        attempt,
                        max_retries = options.max_retries,
                        retry_after_secs = retry_after.as_secs_f64(),
                        "rate limited by server, backing off"
                    );
                    self.clock.sleep(retry_after).await;
                }
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
