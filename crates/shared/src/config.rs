//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use std::collections::HashMap;
use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;
use crate::observability::ObservabilityConfig;

/// 飞书/Lark 应用凭证配置
#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct LarkAppSettings {
    /// 应用类型：feishu（国内版）或 lark（国际版）
    pub app_type: String,
    pub app_id: String,
    pub app_secret: String,
}

impl std::fmt::Debug for LarkAppSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LarkAppSettings")
            .field("app_type", &self.app_type)
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .finish()
    }
}

/// 飞书渠道配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LarkSettings {
    pub enabled: bool,
    /// 消息未指定发送渠道时使用的默认渠道名
    pub default_channel: String,
    /// 消息队列容量，0 表示按 CPU 核数自动计算
    pub channel_size: usize,
    /// worker 数量，0 表示按 CPU 核数自动计算
    pub pool_size: usize,
    /// 限流时的最大重试次数，0 表示使用默认值
    pub max_retries: u32,
    /// 单次 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 机器人名称 -> webhook 地址
    pub bot_webhooks: HashMap<String, String>,
    /// 应用名称 -> 应用凭证
    pub apps: HashMap<String, LarkAppSettings>,
}

impl Default for LarkSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            default_channel: String::new(),
            channel_size: 0,
            pool_size: 0,
            max_retries: 3,
            request_timeout_secs: 10,
            bot_webhooks: HashMap::new(),
            apps: HashMap::new(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub observability: ObservabilityConfig,
    pub lark: LarkSettings,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（NOTIFY 前缀，`__` 分隔层级，如 NOTIFY__LARK__DEFAULT_CHANNEL -> lark.default_channel）
    pub fn load(service_name: &str) -> Result<Self> {
        let env = std::env::var("NOTIFY_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            // 默认配置
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .set_default("observability.service_name", service_name)?
            // 加载默认配置文件
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            // 加载环境特定配置
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            // 加载服务特定配置（如 lark-notifier.toml）
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            // 环境变量覆盖；字段名本身含下划线，层级分隔符使用双下划线
            .add_source(
                Environment::with_prefix("NOTIFY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        Ok(builder.build()?.try_deserialize()?)
    }
}
