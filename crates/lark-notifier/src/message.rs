//! 飞书消息模型
//!
//! 消息内容按消息类型建模为枚举，每种类型只携带它需要的数据，
//! 消息类型与内容不一致的情况在编译期即被排除。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LarkError;

/// 消息级别，决定卡片标题栏的颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Success,
    Error,
    Warn,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
            Self::Warn => "warn",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = LarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            other => Err(LarkError::InvalidParams(format!("未知的消息级别: {other}"))),
        }
    }
}

/// 消息内容
///
/// 字符串类变体携带对应的 key 或 id，JSON 类变体原样透传给开放平台。
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    /// image_key
    Image(String),
    /// file_key
    Audio(String),
    /// file_key
    File(String),
    /// file_key
    Media(String),
    /// file_key
    Sticker(String),
    /// chat_id
    ShareChat(String),
    /// user_id
    ShareUser(String),
    Post(Value),
    Interactive(Value),
    System(Value),
}

impl MessageContent {
    /// 开放平台使用的 msg_type 名称
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Audio(_) => "audio",
            Self::File(_) => "file",
            Self::Media(_) => "media",
            Self::Sticker(_) => "sticker",
            Self::ShareChat(_) => "share_chat",
            Self::ShareUser(_) => "share_user",
            Self::Post(_) => "post",
            Self::Interactive(_) => "interactive",
            Self::System(_) => "system",
        }
    }

    /// 是否为空的纯文本内容
    pub fn is_empty_text(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }
}

/// 待发送的飞书消息
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// 消息 ID，未指定时由分发器生成
    pub id: Option<String>,
    /// 发送渠道名（机器人或应用），未指定时使用默认渠道
    pub channel: Option<String>,
    /// 接收人的 user_id，仅应用渠道需要
    pub recipient: Option<String>,
    pub level: Option<Level>,
    /// 标题，仅用于将纯文本渲染为卡片
    pub title: Option<String>,
    pub content: MessageContent,
}

impl Message {
    pub fn new(content: MessageContent) -> Self {
        Self {
            id: None,
            channel: None,
            recipient: None,
            level: None,
            title: None,
            content,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(MessageContent::Text(text.into()))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn message_type(&self) -> &'static str {
        self.content.message_type()
    }

    /// 标题与纯文本内容都为空的消息没有可发送的内容
    pub(crate) fn is_blank(&self) -> bool {
        let title_empty = self.title.as_deref().is_none_or(|t| t.trim().is_empty());
        title_empty && self.content.is_empty_text()
    }

    /// 设置了级别与标题的纯文本消息会被渲染为卡片
    pub(crate) fn wants_card(&self) -> bool {
        self.level.is_some()
            && self.title.as_deref().is_some_and(|t| !t.is_empty())
            && matches!(self.content, MessageContent::Text(_))
    }
}
