//! CLI 命令定义
//!
//! 使用 clap derive 宏定义命令行接口结构。

use clap::{Args, Parser, Subcommand};

use crate::message::{Level, Message};

/// 飞书通知命令行工具
///
/// 渠道配置从 config/ 目录和 `NOTIFY__` 前缀的环境变量加载。
#[derive(Parser, Debug)]
#[command(name = "lark-notifier")]
#[command(version, about = "飞书通知命令行工具")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 服务名称，同时决定额外加载的 config/{service}.toml
    #[arg(long, default_value = "lark-notifier")]
    pub service: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// 子命令枚举
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 发送一条文本消息
    ///
    /// 同时指定 level 与 title 时渲染为卡片消息。
    Send(SendArgs),

    /// 打印应用当前的访问令牌
    Token {
        /// 应用名称（apps 配置中的键）
        #[arg(short, long)]
        app: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    /// 消息内容
    #[arg(short, long)]
    pub content: String,

    /// 卡片标题
    #[arg(short, long)]
    pub title: Option<String>,

    /// 消息级别 (info, success, warn, error)
    #[arg(short, long)]
    pub level: Option<Level>,

    /// 发送渠道名，缺省使用 default_channel
    #[arg(long)]
    pub channel: Option<String>,

    /// 接收人 user_id，应用渠道必填
    #[arg(short, long)]
    pub recipient: Option<String>,
}

impl SendArgs {
    pub fn into_message(self) -> Message {
        let mut message = Message::text(self.content);
        message.title = self.title;
        message.level = self.level;
        message.channel = self.channel;
        message.recipient = self.recipient;
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from([
            "lark-notifier",
            "send",
            "-c",
            "磁盘使用率 95%",
            "-t",
            "磁盘告警",
            "-l",
            "warn",
            "--channel",
            "alert_app",
            "-r",
            "ou_123",
        ])
        .unwrap();

        assert_eq!(cli.service, "lark-notifier");
        let Commands::Send(args) = cli.command else {
            panic!("expected send command");
        };
        let message = args.into_message();
        assert_eq!(message.level, Some(Level::Warn));
        assert_eq!(message.title.as_deref(), Some("磁盘告警"));
        assert_eq!(message.channel.as_deref(), Some("alert_app"));
        assert_eq!(message.recipient.as_deref(), Some("ou_123"));
        assert!(message.wants_card());
    }

    #[test]
    fn test_parse_token() {
        let cli = Cli::try_parse_from(["lark-notifier", "token", "--app", "alert_app"]).unwrap();
        assert!(matches!(cli.command, Commands::Token { ref app } if app == "alert_app"));
    }

    #[test]
    fn test_invalid_level_rejected() {
        let result = Cli::try_parse_from(["lark-notifier", "send", "-c", "hi", "-l", "fatal"]);
        assert!(result.is_err());
    }
}
