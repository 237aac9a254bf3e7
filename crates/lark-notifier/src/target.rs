//! 发送渠道配置与路由表
//!
//! 飞书渠道有两种投递方式：机器人 webhook 与应用消息接口。
//! 两者共用同一个名称空间，消息通过渠道名选择投递方式。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use notify_shared::config::LarkSettings;
use tracing::info;

use crate::credential::{Credential, TokenResolver};
use crate::error::LarkError;

/// 国内版开放平台地址
pub const FEISHU_HOST: &str = "https://open.feishu.cn";
/// 国际版开放平台地址
pub const LARK_HOST: &str = "https://open.larksuite.com";

const APP_ACCESS_TOKEN_API: &str = "/open-apis/auth/v3/app_access_token/internal/";
const MESSAGE_API: &str = "/open-apis/im/v1/messages";

/// 默认的消息队列容量与 worker 数量倍数
const DEFAULT_SIZE_PER_CPU: usize = 10;

// ---------------------------------------------------------------------------
// 渠道目标
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppType {
    Feishu,
    Lark,
}

impl AppType {
    pub fn host(&self) -> &'static str {
        match self {
            Self::Feishu => FEISHU_HOST,
            Self::Lark => LARK_HOST,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}{}", self.host(), APP_ACCESS_TOKEN_API)
    }

    pub fn message_url(&self) -> String {
        format!("{}{}", self.host(), MESSAGE_API)
    }
}

impl FromStr for AppType {
    type Err = LarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feishu" => Ok(Self::Feishu),
            "lark" => Ok(Self::Lark),
            other => Err(LarkError::InvalidConfiguration(format!(
                "无效的应用类型: {other}"
            ))),
        }
    }
}

/// 应用消息渠道
#[derive(Debug, Clone)]
pub struct AppTarget {
    pub name: String,
    pub app_type: AppType,
    pub credential: Credential,
}

/// 已校验的发送渠道
#[derive(Debug, Clone)]
pub enum ChannelTarget {
    Webhook { name: String, url: String },
    App(AppTarget),
}

impl ChannelTarget {
    pub fn name(&self) -> &str {
        match self {
            Self::Webhook { name, .. } => name,
            Self::App(app) => &app.name,
        }
    }

    /// 投递方式，用于日志和指标标签
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Webhook { .. } => "webhook",
            Self::App(_) => "app",
        }
    }
}

// ---------------------------------------------------------------------------
// 配置
// ---------------------------------------------------------------------------

/// 单个应用的配置
///
/// `resolver` 与 `app_id`/`app_secret` 二选一，同时提供时优先使用 `resolver`。
#[derive(Clone, Default)]
pub struct LarkAppConfig {
    pub app_type: String,
    pub app_id: String,
    pub app_secret: String,
    pub resolver: Option<Arc<dyn TokenResolver>>,
}

impl LarkAppConfig {
    pub fn with_secret(
        app_type: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        Self {
            app_type: app_type.into(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            resolver: None,
        }
    }

    pub fn with_resolver(
        app_type: impl Into<String>,
        resolver: impl TokenResolver + 'static,
    ) -> Self {
        Self {
            app_type: app_type.into(),
            resolver: Some(Arc::new(resolver)),
            ..Self::default()
        }
    }

    fn credential(&self, name: &str) -> Result<Credential, LarkError> {
        if let Some(resolver) = &self.resolver {
            return Ok(Credential::Resolver(resolver.clone()));
        }
        if self.app_id.is_empty() || self.app_secret.is_empty() {
            return Err(LarkError::InvalidConfiguration(format!(
                "应用 {name} 需要同时配置 app_id 与 app_secret，或提供自定义令牌获取方式"
            )));
        }
        Ok(Credential::secret(&self.app_id, &self.app_secret))
    }
}

impl fmt::Debug for LarkAppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LarkAppConfig")
            .field("app_type", &self.app_type)
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

/// 飞书分发器配置
#[derive(Debug, Clone)]
pub struct LarkConfig {
    /// 消息未指定渠道时使用的渠道名
    pub default_channel: String,
    /// 队列容量，0 表示 10 × CPU 核数
    pub channel_size: usize,
    /// worker 数量，0 表示 10 × CPU 核数
    pub pool_size: usize,
    /// 限流最大重试次数，0 表示 3
    pub max_retries: u32,
    pub request_timeout: Duration,
    /// 机器人名称 -> webhook 地址
    pub bot_webhooks: HashMap<String, String>,
    /// 应用名称 -> 应用配置
    pub apps: HashMap<String, LarkAppConfig>,
}

impl Default for LarkConfig {
    fn default() -> Self {
        Self {
            default_channel: String::new(),
            channel_size: 0,
            pool_size: 0,
            max_retries: 3,
            request_timeout: Duration::from_secs(10),
            bot_webhooks: HashMap::new(),
            apps: HashMap::new(),
        }
    }
}

impl LarkConfig {
    /// 从配置文件中的飞书配置段转换
    pub fn from_settings(settings: &LarkSettings) -> Self {
        let apps = settings
            .apps
            .iter()
            .map(|(name, app)| {
                (
                    name.clone(),
                    LarkAppConfig::with_secret(&app.app_type, &app.app_id, &app.app_secret),
                )
            })
            .collect();

        Self {
            default_channel: settings.default_channel.clone(),
            channel_size: settings.channel_size,
            pool_size: settings.pool_size,
            max_retries: settings.max_retries,
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            bot_webhooks: settings.bot_webhooks.clone(),
            apps,
        }
    }

    pub fn with_default_channel(mut self, name: impl Into<String>) -> Self {
        self.default_channel = name.into();
        self
    }

    pub fn with_webhook(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.bot_webhooks.insert(name.into(), url.into());
        self
    }

    pub fn with_app(mut self, name: impl Into<String>, app: LarkAppConfig) -> Self {
        self.apps.insert(name.into(), app);
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), LarkError> {
        self.routing_table().map(|_| ())
    }

    pub fn effective_channel_size(&self) -> usize {
        non_zero_or_default(self.channel_size)
    }

    pub fn effective_pool_size(&self) -> usize {
        non_zero_or_default(self.pool_size)
    }

    /// 校验并构建路由表
    pub(crate) fn routing_table(&self) -> Result<RoutingTable, LarkError> {
        if self.bot_webhooks.is_empty() && self.apps.is_empty() {
            return Err(LarkError::InvalidConfiguration(
                "没有可用的发送渠道，请配置 bot_webhooks 或 apps".to_string(),
            ));
        }
        if self.default_channel.is_empty() {
            return Err(LarkError::InvalidConfiguration(
                "必须配置默认发送渠道 default_channel".to_string(),
            ));
        }

        let mut targets = HashMap::with_capacity(self.bot_webhooks.len() + self.apps.len());

        for (name, url) in &self.bot_webhooks {
            if url.trim().is_empty() {
                return Err(LarkError::InvalidConfiguration(format!(
                    "机器人 {name} 的 webhook 地址为空"
                )));
            }
            targets.insert(
                name.clone(),
                ChannelTarget::Webhook {
                    name: name.clone(),
                    url: url.clone(),
                },
            );
        }

        for (name, app) in &self.apps {
            if targets.contains_key(name) {
                return Err(LarkError::InvalidConfiguration(format!(
                    "渠道名 {name} 同时被机器人和应用使用"
                )));
            }
            let target = AppTarget {
                name: name.clone(),
                app_type: app.app_type.parse()?,
                credential: app.credential(name)?,
            };
            targets.insert(name.clone(), ChannelTarget::App(target));
        }

        if !targets.contains_key(&self.default_channel) {
            return Err(LarkError::InvalidConfiguration(format!(
                "默认发送渠道 {} 不存在",
                self.default_channel
            )));
        }

        if self.apps.is_empty() {
            info!("仅配置了机器人渠道，消息只会通过 webhook 发送");
        } else if self.bot_webhooks.is_empty() {
            info!("仅配置了应用渠道，消息只会通过应用消息接口发送");
        }

        Ok(RoutingTable {
            default_channel: self.default_channel.clone(),
            targets,
        })
    }
}

fn non_zero_or_default(size: usize) -> usize {
    if size > 0 {
        return size;
    }
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    DEFAULT_SIZE_PER_CPU * cpus
}

// ---------------------------------------------------------------------------
// 路由表
// ---------------------------------------------------------------------------

/// 渠道名到发送目标的映射，构造后只读
#[derive(Debug, Clone)]
pub struct RoutingTable {
    default_channel: String,
    targets: HashMap<String, ChannelTarget>,
}

impl RoutingTable {
    pub fn default_channel(&self) -> &str {
        &self.default_channel
    }

    /// 消息实际使用的渠道名，空渠道名视为未指定
    pub fn channel_name<'a>(&'a self, channel: Option<&'a str>) -> &'a str {
        channel
            .filter(|c| !c.is_empty())
            .unwrap_or(self.default_channel.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&ChannelTarget> {
        self.targets.get(name)
    }

    /// 按消息的渠道名查找发送目标
    pub fn resolve(&self, channel: Option<&str>) -> Result<&ChannelTarget, LarkError> {
        let name = self.channel_name(channel);
        self.get(name).ok_or_else(|| LarkError::ChannelNotFound {
            channel: name.to_string(),
        })
    }
}
