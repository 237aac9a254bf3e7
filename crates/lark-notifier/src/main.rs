//! 飞书通知命令行入口
//!
//! 加载配置、初始化日志与指标后执行子命令。

use clap::Parser;
use lark_notifier::cli::{Cli, CommandRunner, Commands};
use notify_shared::config::AppConfig;
use notify_shared::observability;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.service)?;
    let guard = observability::init(&config.observability)?;

    info!(
        service = %config.service_name,
        environment = %config.environment,
        metrics_enabled = guard.metrics_enabled(),
        "Starting lark-notifier..."
    );

    let runner = CommandRunner::from_settings(&config.lark)?;

    match cli.command {
        Commands::Send(args) => {
            let outcome = runner.run_send(args).await?;
            match outcome.result {
                Ok(()) => info!(
                    message_id = %outcome.message_id,
                    channel = %outcome.channel,
                    "消息发送成功"
                ),
                Err(e) => {
                    error!(
                        message_id = %outcome.message_id,
                        channel = %outcome.channel,
                        code = e.code(),
                        "消息发送失败"
                    );
                    return Err(e.into());
                }
            }
        }
        Commands::Token { app } => {
            let token = runner.run_token(&app).await?;
            println!("{token}");
        }
    }

    Ok(())
}
