//! 开放平台 HTTP 请求
//!
//! `HttpTransport` 只负责发出单次请求，`RequestExecutor` 在其之上处理限流重试：
//! 遇到 HTTP 429 时按 `x-ogw-ratelimit-reset` 响应头等待后重试，
//! 其他状态码原样返回，由调用方解析业务错误码。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify_shared::observability::metrics::record_rate_limited;
use notify_shared::retry::RateLimitPolicy;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::LarkError;

/// 限流重置时间响应头（整数秒）
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ogw-ratelimit-reset";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

// ---------------------------------------------------------------------------
// 请求与响应
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    /// 构造 JSON POST 请求
    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string())],
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// 按名称查找请求头（不区分大小写）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: HeaderMap,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: HeaderMap::new(),
        }
    }

    /// 取响应头的第一个值，非 ASCII 的值视为不存在
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS.as_u16()
    }

    /// 将响应体解析为 JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, LarkError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            LarkError::ResponseDecode(format!(
                "status={}, error={}, body={}",
                self.status,
                e,
                String::from_utf8_lossy(&self.body)
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// HTTP 传输层抽象
///
/// 连接失败、超时等网络错误返回 `LarkError::Transport`，
/// 任何 HTTP 状态码（包括 4xx/5xx）都作为正常响应返回。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, LarkError>;
}

/// 基于 reqwest 的传输实现
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, LarkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LarkError::InvalidConfiguration(format!("HTTP 客户端初始化失败: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, LarkError> {
        let transport_err = |e: reqwest::Error| LarkError::Transport {
            url: request.url.clone(),
            reason: e.to_string(),
        };

        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_err)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_err)?;

        Ok(ApiResponse {
            status,
            body: body.to_vec(),
            headers,
        })
    }
}

// ---------------------------------------------------------------------------
// RequestExecutor
// ---------------------------------------------------------------------------

/// 带限流重试的请求执行器
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// 执行请求
    ///
    /// 最多尝试 `max_retries + 1` 次（`max_retries` 为 0 时按 3 处理）。
    /// 网络错误立即返回，不做重试。
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn execute(
        &self,
        request: &ApiRequest,
        max_retries: u32,
    ) -> Result<ApiResponse, LarkError> {
        let policy = RateLimitPolicy::with_max_retries(max_retries);
        let mut attempt = 0;

        loop {
            let response = self.transport.send(request).await?;
            if !response.is_rate_limited() {
                debug!(status = response.status, attempt, "请求完成");
                return Ok(response);
            }

            record_rate_limited();

            if !policy.should_retry(attempt) {
                warn!(
                    retries = policy.max_retries,
                    attempts = policy.total_attempts(),
                    "限流重试次数已用尽"
                );
                return Err(LarkError::RateLimitExceeded {
                    retries: policy.max_retries,
                });
            }

            let cooldown = policy.cooldown(response.header(RATE_LIMIT_RESET_HEADER));
            attempt += 1;
            warn!(
                attempt,
                max_retries = policy.max_retries,
                cooldown_secs = cooldown.as_secs(),
                "触发限流，等待后重试"
            );
            tokio::time::sleep(cooldown).await;
        }
    }
}
