//! Prometheus 指标模块
//!
//! 基于 metrics crate 记录指标，metrics-exporter-prometheus 负责导出。
//! 未安装 recorder 时所有记录函数都是空操作，库代码可以无条件调用。

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use super::ObservabilityConfig;

/// 指标名称常量，集中管理避免拼写不一致
pub mod names {
    pub const MESSAGES_SUBMITTED: &str = "notify_messages_submitted_total";
    pub const MESSAGES_DISPATCHED: &str = "notify_messages_dispatched_total";
    pub const RATE_LIMITED: &str = "notify_rate_limited_total";
    pub const TOKENS_ISSUED: &str = "notify_tokens_issued_total";
    pub const TOKEN_CACHE_HITS: &str = "notify_token_cache_hits_total";
}

/// 初始化 Prometheus 指标导出
///
/// 在指定端口暴露 `/metrics` 端点。返回是否实际启用了导出。
pub fn init(config: &ObservabilityConfig) -> Result<bool> {
    if !config.metrics_enabled {
        return Ok(false);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    register_common_metrics(&config.service_name);
    info!("Metrics server listening on {}", addr);

    Ok(true)
}

/// 注册通用指标描述，这些描述会出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(names::MESSAGES_SUBMITTED, "Total number of submitted messages");
    metrics::describe_counter!(
        names::MESSAGES_DISPATCHED,
        "Total number of dispatched messages by delivery mode and result"
    );
    metrics::describe_counter!(names::RATE_LIMITED, "Total number of HTTP 429 responses");
    metrics::describe_counter!(names::TOKENS_ISSUED, "Total number of access token issuances");
    metrics::describe_counter!(names::TOKEN_CACHE_HITS, "Total number of token cache hits");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录消息入队
#[inline]
pub fn record_submitted(channel: &str) {
    metrics::counter!(names::MESSAGES_SUBMITTED, "channel" => channel.to_string()).increment(1);
}

/// 记录消息投递结果
#[inline]
pub fn record_dispatched(channel: &str, mode: &str, result: &str) {
    metrics::counter!(
        names::MESSAGES_DISPATCHED,
        "channel" => channel.to_string(),
        "mode" => mode.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// 记录一次限流响应
#[inline]
pub fn record_rate_limited() {
    metrics::counter!(names::RATE_LIMITED).increment(1);
}

/// 记录令牌签发
#[inline]
pub fn record_token_issued(app: &str) {
    metrics::counter!(names::TOKENS_ISSUED, "app" => app.to_string()).increment(1);
}

/// 记录令牌缓存命中
#[inline]
pub fn record_token_cache_hit(app: &str) {
    metrics::counter!(names::TOKEN_CACHE_HITS, "app" => app.to_string()).increment(1);
}
