//! CLI 模块
//!
//! - `send` - 通过飞书渠道发送一条消息并等待发送结果
//! - `token` - 打印应用当前的访问令牌
//!
//! # 使用示例
//!
//! ```bash
//! # 通过默认渠道发送文本
//! lark-notifier send -c "build failed"
//!
//! # 发送带级别和标题的卡片给应用用户
//! lark-notifier send -c "磁盘使用率 95%" -t "磁盘告警" -l warn --channel alert_app -r ou_123
//!
//! # 查看应用令牌
//! lark-notifier token --app alert_app
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands, SendArgs};
pub use runner::CommandRunner;
