//! 多渠道通知管理器
//!
//! 统一入口：一次 `send` 可以扇出到多个渠道，所有渠道共享同一个消息 ID。
//! 每个渠道通过 `ChannelNotifier` 接入，目前内置飞书渠道。

pub mod channel;
pub mod manager;

pub use channel::{Channel, ChannelNotifier, LarkNotifier, Notice};
pub use lark_notifier::Level;
pub use manager::{NotifyManager, NotifyManagerBuilder};
