//! 通知渠道抽象
//!
//! 每个渠道实现 `ChannelNotifier`，管理器只依赖这个 trait。
//! 钉钉、企业微信等渠道按同样的方式接入即可。

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use lark_notifier::{LarkConfig, LarkDispatcher, LarkError, Level, Message};
use notify_shared::error::NotifyError;
use serde::{Deserialize, Serialize};

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Lark,
    DingTalk,
    Wechat,
    Email,
    Telegram,
    Bark,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lark => "lark",
            Self::DingTalk => "ding_talk",
            Self::Wechat => "wechat",
            Self::Email => "email",
            Self::Telegram => "telegram",
            Self::Bark => "bark",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lark" => Ok(Self::Lark),
            "ding_talk" => Ok(Self::DingTalk),
            "wechat" => Ok(Self::Wechat),
            "email" => Ok(Self::Email),
            "telegram" => Ok(Self::Telegram),
            "bark" => Ok(Self::Bark),
            other => Err(NotifyError::InvalidParams(format!("未知的通知渠道: {other}"))),
        }
    }
}

/// 管理器下发给各渠道的通知
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: String,
    pub level: Level,
    /// 接收人，空字符串表示使用渠道的默认接收方
    pub recipient: String,
    pub title: String,
    pub content: String,
}

/// 通知渠道 trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelNotifier: Send + Sync {
    fn channel(&self) -> Channel;

    /// 启动渠道的后台处理，需在 tokio 运行时内调用
    fn start(&self) -> Result<(), NotifyError>;

    /// 提交通知，返回渠道内的消息 ID
    async fn submit(&self, notice: &Notice) -> Result<String, NotifyError>;

    /// 关闭渠道，等待已提交的通知处理完成
    async fn close(&self);
}

// ---------------------------------------------------------------------------
// 飞书渠道
// ---------------------------------------------------------------------------

pub struct LarkNotifier {
    dispatcher: LarkDispatcher,
}

impl LarkNotifier {
    pub fn new(dispatcher: LarkDispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn from_config(config: LarkConfig) -> Result<Self, NotifyError> {
        let dispatcher = LarkDispatcher::new(config).map_err(submit_error)?;
        Ok(Self::new(dispatcher))
    }

    pub fn dispatcher(&self) -> &LarkDispatcher {
        &self.dispatcher
    }
}

fn submit_error(err: LarkError) -> NotifyError {
    match err {
        LarkError::InvalidConfiguration(msg) => NotifyError::InvalidConfiguration(msg),
        LarkError::InvalidParams(msg) => NotifyError::InvalidParams(msg),
        other => NotifyError::ChannelSubmit {
            channel: Channel::Lark.to_string(),
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl ChannelNotifier for LarkNotifier {
    fn channel(&self) -> Channel {
        Channel::Lark
    }

    fn start(&self) -> Result<(), NotifyError> {
        self.dispatcher.start().map_err(submit_error)
    }

    async fn submit(&self, notice: &Notice) -> Result<String, NotifyError> {
        let mut message = Message::text(notice.content.clone())
            .with_id(notice.id.clone())
            .with_level(notice.level)
            .with_title(notice.title.clone());
        if !notice.recipient.is_empty() {
            message = message.with_recipient(notice.recipient.clone());
        }

        self.dispatcher.submit(message).await.map_err(submit_error)
    }

    async fn close(&self) {
        self.dispatcher.close().await;
    }
}
