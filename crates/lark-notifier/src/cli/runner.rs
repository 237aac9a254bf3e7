//! CLI 命令执行器

use anyhow::{Context, Result};
use notify_shared::config::LarkSettings;
use notify_shared::error::NotifyError;
use tracing::info;

use crate::cli::SendArgs;
use crate::dispatcher::{LarkDispatcher, SendResult};
use crate::target::LarkConfig;

pub struct CommandRunner {
    dispatcher: LarkDispatcher,
}

impl CommandRunner {
    /// 根据配置文件中的飞书配置段创建
    pub fn from_settings(settings: &LarkSettings) -> Result<Self> {
        if !settings.enabled {
            return Err(NotifyError::ChannelDisabled {
                channel: "lark".to_string(),
            })
            .context("请设置 lark.enabled = true");
        }
        let dispatcher = LarkDispatcher::new(LarkConfig::from_settings(settings))
            .context("飞书渠道配置无效")?;
        Ok(Self::with_dispatcher(dispatcher))
    }

    pub fn with_dispatcher(dispatcher: LarkDispatcher) -> Self {
        Self { dispatcher }
    }

    /// 发送一条消息并等待发送结果
    pub async fn run_send(&self, args: SendArgs) -> Result<SendResult> {
        self.dispatcher.start()?;

        let receipt = match self.dispatcher.submit_tracked(args.into_message()).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.dispatcher.close().await;
                return Err(e.into());
            }
        };
        info!(message_id = %receipt.message_id(), "消息已提交");

        let outcome = receipt.outcome().await;
        self.dispatcher.close().await;
        Ok(outcome)
    }

    /// 获取应用令牌
    pub async fn run_token(&self, app: &str) -> Result<String> {
        self.dispatcher
            .token(app)
            .await
            .with_context(|| format!("获取应用 {app} 的令牌失败"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LarkError;
    use crate::testing::ScriptedTransport;
    use std::sync::Arc;

    fn runner(transport: Arc<ScriptedTransport>) -> CommandRunner {
        let config = LarkConfig::default()
            .with_default_channel("ops")
            .with_webhook("ops", "https://open.feishu.cn/open-apis/bot/v2/hook/abc");
        CommandRunner::with_dispatcher(LarkDispatcher::with_transport(config, transport).unwrap())
    }

    fn send_args(content: &str) -> SendArgs {
        SendArgs {
            content: content.to_string(),
            title: None,
            level: None,
            channel: None,
            recipient: None,
        }
    }

    #[test]
    fn test_disabled_settings_rejected() {
        let Err(err) = CommandRunner::from_settings(&LarkSettings::default()) else {
            panic!("未启用的飞书渠道应被拒绝");
        };
        assert!(matches!(
            err.downcast_ref::<NotifyError>(),
            Some(NotifyError::ChannelDisabled { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_send() {
        let transport = Arc::new(ScriptedTransport::new());
        let outcome = runner(transport.clone())
            .run_send(send_args("deploy finished"))
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.channel, "ops");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_run_send_blank_message() {
        let result = runner(Arc::new(ScriptedTransport::new()))
            .run_send(send_args(""))
            .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LarkError>(),
            Some(LarkError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn test_run_token_for_webhook_fails() {
        let result = runner(Arc::new(ScriptedTransport::new()))
            .run_token("ops")
            .await;
        assert!(result.is_err());
    }
}
