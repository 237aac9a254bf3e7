//! 限流重试策略
//!
//! 开放平台在触发限流时返回 HTTP 429，并通过响应头告知需要等待的秒数。
//! 这里只描述"重试几次、每次等多久"，具体的请求执行由各渠道完成。
//! 非限流的错误（连接失败、业务错误码）不在此策略的处理范围内。

use std::time::Duration;

/// 未指定重试次数时的默认值
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 限流响应头缺失或无法解析时的默认冷却时间（秒）
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// RateLimitPolicy — 限流重试策略配置
// ---------------------------------------------------------------------------

/// 限流重试策略
///
/// 与指数退避不同，等待时间优先采用服务端给出的重置秒数，
/// 只有服务端未给出有效值时才使用固定的默认冷却时间。
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// 最大重试次数（不含首次执行）
    pub max_retries: u32,
    /// 响应头缺失或非法时的冷却时间
    pub default_cooldown: Duration,
}

impl Default for RateLimitPolicy {
    /// 默认策略：最多重试 3 次，缺省冷却 60 秒
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            default_cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
        }
    }
}

impl RateLimitPolicy {
    /// 使用指定重试次数创建策略，0 会被规范化为默认值
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries: normalize_max_retries(max_retries),
            ..Self::default()
        }
    }

    /// 总尝试次数 = 首次执行 + 最大重试次数
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// 是否应继续重试
    ///
    /// attempt 表示已经失败的次数，当 attempt < max_retries 时返回 true。
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// 根据限流响应头计算冷却时间
    ///
    /// 响应头的值按整数秒解析，缺失、为空或无法解析时回退到默认冷却时间。
    pub fn cooldown(&self, reset_header: Option<&str>) -> Duration {
        reset_header
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.default_cooldown)
    }
}

/// 将非正的重试次数规范化为默认值
pub fn normalize_max_retries(max_retries: u32) -> u32 {
    if max_retries == 0 {
        DEFAULT_MAX_RETRIES
    } else {
        max_retries
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
