//! 测试用的 HTTP 传输实现
//!
//! 按 URL 片段返回预设响应，并记录收到的全部请求，供分发流程的端到端测试断言。

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::error::LarkError;
use crate::request::{ApiRequest, ApiResponse, HttpTransport};

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    rules: Mutex<Vec<(String, ApiResponse)>>,
    requests: Mutex<Vec<ApiRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 每次请求前等待，用于观察并发与背压
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URL 包含 `pattern` 的请求返回 `response`，先添加的规则优先
    pub(crate) fn respond(self, pattern: &str, response: ApiResponse) -> Self {
        self.rules.lock().push((pattern.to_string(), response));
        self
    }

    pub(crate) fn respond_json(self, pattern: &str, body: Value) -> Self {
        self.respond(pattern, ApiResponse::new(200, body.to_string()))
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn requests_to(&self, pattern: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains(pattern))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, LarkError> {
        self.requests.lock().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .rules
            .lock()
            .iter()
            .find(|(pattern, _)| request.url.contains(pattern.as_str()))
            .map(|(_, response)| response.clone());

        Ok(scripted.unwrap_or_else(|| {
            ApiResponse::new(200, json!({"code": 0, "msg": "success"}).to_string())
        }))
    }
}
