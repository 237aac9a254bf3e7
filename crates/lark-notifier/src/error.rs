//! 飞书渠道错误类型
//!
//! 区分配置错误（构造时即失败）、参数错误（提交时同步返回）与投递错误
//! （在 worker 中记录日志后丢弃），便于调用方判断哪些错误需要处理。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LarkError {
    // ==================== 网络错误 ====================
    #[error("HTTP 请求失败: url={url}, 原因={reason}")]
    Transport { url: String, reason: String },

    #[error("触发限流，重试 {retries} 次后仍失败")]
    RateLimitExceeded { retries: u32 },

    // ==================== 凭证错误 ====================
    #[error("获取应用令牌失败: 应用={app}, 原因={message}")]
    TokenIssuance { app: String, message: String },

    // ==================== 内容错误 ====================
    #[error("卡片模板渲染失败: {0}")]
    TemplateRender(String),

    #[error("应用渠道缺少接收人: {channel}")]
    MissingRecipient { channel: String },

    #[error("渠道 {channel} 不支持的消息类型: {msg_type}")]
    UnsupportedMessageType { channel: String, msg_type: String },

    // ==================== 投递错误 ====================
    #[error("飞书发送渠道不存在: {channel}")]
    ChannelNotFound { channel: String },

    #[error("消息投递失败: 渠道={channel}, 错误码={code}, 原因={message}")]
    Delivery {
        channel: String,
        code: i64,
        message: String,
    },

    #[error("响应解析失败: {0}")]
    ResponseDecode(String),

    // ==================== 配置与参数错误 ====================
    #[error("无效的飞书配置: {0}")]
    InvalidConfiguration(String),

    #[error("无效的参数: {0}")]
    InvalidParams(String),

    #[error("飞书通知已关闭")]
    Closed,
}

impl LarkError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::TokenIssuance { .. } => "TOKEN_ISSUANCE_FAILED",
            Self::TemplateRender(_) => "TEMPLATE_RENDER_FAILED",
            Self::MissingRecipient { .. } => "MISSING_RECIPIENT",
            Self::UnsupportedMessageType { .. } => "UNSUPPORTED_MESSAGE_TYPE",
            Self::ChannelNotFound { .. } => "CHANNEL_NOT_FOUND",
            Self::Delivery { .. } => "DELIVERY_FAILED",
            Self::ResponseDecode(_) => "RESPONSE_DECODE_FAILED",
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::InvalidParams(_) => "INVALID_PARAMS",
            Self::Closed => "CLOSED",
        }
    }

    /// 是否为可重试的错误
    ///
    /// 投递失败不会自动重试，这里只供调用方决定是否重新提交。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::RateLimitExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LarkError::Delivery {
            channel: "ops".to_string(),
            code: 19001,
            message: "param invalid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "消息投递失败: 渠道=ops, 错误码=19001, 原因=param invalid"
        );

        let err = LarkError::RateLimitExceeded { retries: 3 };
        assert_eq!(err.to_string(), "触发限流，重试 3 次后仍失败");
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            LarkError::ChannelNotFound {
                channel: "missing".to_string()
            }
            .code(),
            "CHANNEL_NOT_FOUND"
        );
        assert_eq!(LarkError::Closed.code(), "CLOSED");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(
            LarkError::Transport {
                url: "https://open.feishu.cn".to_string(),
                reason: "timeout".to_string(),
            }
            .is_retryable()
        );
        assert!(LarkError::RateLimitExceeded { retries: 3 }.is_retryable());
        assert!(
            !LarkError::MissingRecipient {
                channel: "alert_app".to_string()
            }
            .is_retryable()
        );
        assert!(!LarkError::TemplateRender("bad".to_string()).is_retryable());
    }
}
