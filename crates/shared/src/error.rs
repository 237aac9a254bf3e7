//! 统一错误处理模块
//!
//! 定义各渠道共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 渠道内部的投递错误由各渠道 crate 自行定义，这里只保留跨渠道的公共部分。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum NotifyError {
    // ==================== 配置错误 ====================
    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    #[error("无效的配置: {0}")]
    InvalidConfiguration(String),

    // ==================== 参数错误 ====================
    #[error("无效的参数: {0}")]
    InvalidParams(String),

    // ==================== 渠道错误 ====================
    #[error("通知渠道未启用: {channel}")]
    ChannelDisabled { channel: String },

    #[error("通知提交失败: 渠道={channel}, 原因={reason}")]
    ChannelSubmit { channel: String, reason: String },
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, NotifyError>;

impl NotifyError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::InvalidParams(_) => "INVALID_PARAMS",
            Self::ChannelDisabled { .. } => "CHANNEL_DISABLED",
            Self::ChannelSubmit { .. } => "CHANNEL_SUBMIT_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = NotifyError::ChannelDisabled {
            channel: "bark".to_string(),
        };
        assert_eq!(err.code(), "CHANNEL_DISABLED");
        assert_eq!(err.to_string(), "通知渠道未启用: bark");
    }

    #[test]
    fn test_channel_submit_display() {
        let err = NotifyError::ChannelSubmit {
            channel: "lark".to_string(),
            reason: "队列已关闭".to_string(),
        };
        assert_eq!(err.to_string(), "通知提交失败: 渠道=lark, 原因=队列已关闭");
        assert_eq!(err.code(), "CHANNEL_SUBMIT_FAILED");
    }
}
