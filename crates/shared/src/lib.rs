//! 共享库
//!
//! 包含各通知渠道共用的配置、错误处理、过期缓存、限流重试策略、
//! 消息 ID 生成以及可观测性初始化等基础设施代码。

pub mod cache;
pub mod config;
pub mod error;
pub mod message_id;
pub mod observability;
pub mod retry;
