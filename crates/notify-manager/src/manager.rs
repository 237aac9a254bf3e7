//! 通知管理器
//!
//! 将一条逻辑通知扇出到一个或多个渠道。参数校验失败同步返回错误，
//! 单个渠道提交失败（包括渠道未启用）只记录日志，不影响其他渠道。

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use lark_notifier::{LarkConfig, Level};
use notify_shared::config::AppConfig;
use notify_shared::error::{NotifyError, Result};
use notify_shared::message_id::MessageIdGenerator;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelNotifier, LarkNotifier, Notice};

/// 通知管理器构造器
pub struct NotifyManagerBuilder {
    default_channel: Channel,
    default_level: Level,
    notifiers: Vec<Arc<dyn ChannelNotifier>>,
}

impl Default for NotifyManagerBuilder {
    fn default() -> Self {
        Self {
            default_channel: Channel::Lark,
            default_level: Level::Info,
            notifiers: Vec::new(),
        }
    }
}

impl NotifyManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置注册已启用的渠道
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut builder = Self::new();
        if config.lark.enabled {
            let notifier = LarkNotifier::from_config(LarkConfig::from_settings(&config.lark))?;
            builder = builder.register(notifier);
        }
        Ok(builder)
    }

    pub fn default_channel(mut self, channel: Channel) -> Self {
        self.default_channel = channel;
        self
    }

    pub fn default_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn register(self, notifier: impl ChannelNotifier + 'static) -> Self {
        self.register_arc(Arc::new(notifier))
    }

    pub fn register_arc(mut self, notifier: Arc<dyn ChannelNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// 构建管理器但不启动渠道
    pub fn build(self) -> Result<NotifyManager> {
        let mut notifiers = HashMap::with_capacity(self.notifiers.len());
        for notifier in self.notifiers {
            let channel = notifier.channel();
            if notifiers.insert(channel, notifier).is_some() {
                return Err(NotifyError::InvalidConfiguration(format!(
                    "通知渠道 {channel} 重复注册"
                )));
            }
        }

        if !notifiers.contains_key(&self.default_channel) {
            return Err(NotifyError::InvalidConfiguration(format!(
                "默认通知渠道 {} 未注册",
                self.default_channel
            )));
        }

        Ok(NotifyManager {
            default_channel: self.default_channel,
            default_level: self.default_level,
            ids: MessageIdGenerator::new(),
            notifiers,
        })
    }

    /// 构建管理器并启动所有渠道，需在 tokio 运行时内调用
    pub fn start(self) -> Result<NotifyManager> {
        let manager = self.build()?;
        for notifier in manager.notifiers.values() {
            notifier.start()?;
        }
        info!(
            channels = ?manager.channels(),
            default_channel = %manager.default_channel,
            "通知管理器已启动"
        );
        Ok(manager)
    }
}

/// 通知管理器
pub struct NotifyManager {
    default_channel: Channel,
    default_level: Level,
    ids: MessageIdGenerator,
    notifiers: HashMap<Channel, Arc<dyn ChannelNotifier>>,
}

impl NotifyManager {
    pub fn builder() -> NotifyManagerBuilder {
        NotifyManagerBuilder::new()
    }

    /// 已注册的渠道
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<_> = self.notifiers.keys().copied().collect();
        channels.sort_by_key(|c| c.as_str());
        channels
    }

    /// 发送通知，返回所有渠道共享的消息 ID
    ///
    /// `channels` 为空时使用默认渠道，`level` 为空时使用默认级别。
    pub async fn send(
        &self,
        level: Option<Level>,
        recipient: &str,
        title: &str,
        content: &str,
        channels: &[Channel],
    ) -> Result<String> {
        if title.is_empty() && content.is_empty() {
            return Err(NotifyError::InvalidParams(
                "标题和内容不能同时为空".to_string(),
            ));
        }

        let default_channels = [self.default_channel];
        let channels = if channels.is_empty() {
            &default_channels[..]
        } else {
            channels
        };

        let notice = Notice {
            id: self.ids.next_id(),
            level: level.unwrap_or(self.default_level),
            recipient: recipient.to_string(),
            title: title.to_string(),
            content: content.to_string(),
        };

        let submissions = channels.iter().map(|channel| self.submit_to(*channel, &notice));
        for (channel, result) in channels.iter().zip(join_all(submissions).await) {
            match result {
                Ok(_) => debug!(channel = %channel, message_id = %notice.id, "通知已提交"),
                Err(e) => warn!(
                    channel = %channel,
                    message_id = %notice.id,
                    code = e.code(),
                    error = %e,
                    "通知提交失败"
                ),
            }
        }

        Ok(notice.id)
    }

    async fn submit_to(&self, channel: Channel, notice: &Notice) -> Result<String> {
        let notifier = self
            .notifiers
            .get(&channel)
            .ok_or_else(|| NotifyError::ChannelDisabled {
                channel: channel.to_string(),
            })?;
        notifier.submit(notice).await
    }

    pub async fn info(
        &self,
        recipient: &str,
        title: &str,
        content: &str,
        channels: &[Channel],
    ) -> Result<String> {
        self.send(Some(Level::Info), recipient, title, content, channels)
            .await
    }

    pub async fn success(
        &self,
        recipient: &str,
        title: &str,
        content: &str,
        channels: &[Channel],
    ) -> Result<String> {
        self.send(Some(Level::Success), recipient, title, content, channels)
            .await
    }

    pub async fn error(
        &self,
        recipient: &str,
        title: &str,
        content: &str,
        channels: &[Channel],
    ) -> Result<String> {
        self.send(Some(Level::Error), recipient, title, content, channels)
            .await
    }

    pub async fn warn(
        &self,
        recipient: &str,
        title: &str,
        content: &str,
        channels: &[Channel],
    ) -> Result<String> {
        self.send(Some(Level::Warn), recipient, title, content, channels)
            .await
    }

    /// 并发关闭所有渠道
    pub async fn close(&self) {
        join_all(self.notifiers.values().map(|notifier| notifier.close())).await;
        info!("通知管理器已关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannelNotifier;
    use parking_lot::Mutex;
    use tokio_test::{assert_err, assert_ok};

    type Sent = Arc<Mutex<Vec<Notice>>>;

    /// 记录收到的通知并返回通知 ID
    fn recording(channel: Channel, sent: Sent) -> MockChannelNotifier {
        let mut mock = MockChannelNotifier::new();
        mock.expect_channel().return_const(channel);
        mock.expect_start().returning(|| Ok(()));
        mock.expect_submit().returning(move |notice| {
            sent.lock().push(notice.clone());
            Ok(notice.id.clone())
        });
        mock.expect_close().times(0..).returning(|| ());
        mock
    }

    fn failing(channel: Channel) -> MockChannelNotifier {
        let mut mock = MockChannelNotifier::new();
        mock.expect_channel().return_const(channel);
        mock.expect_start().returning(|| Ok(()));
        mock.expect_submit().returning(move |_| {
            Err(NotifyError::ChannelSubmit {
                channel: channel.to_string(),
                reason: "队列已关闭".to_string(),
            })
        });
        mock
    }

    #[tokio::test]
    async fn test_default_channel_and_level() {
        let sent = Sent::default();
        let manager = NotifyManager::builder()
            .default_level(Level::Warn)
            .register(recording(Channel::Lark, sent.clone()))
            .start()
            .unwrap();

        let id = manager.send(None, "", "磁盘告警", "95%", &[]).await.unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, id);
        assert_eq!(sent[0].level, Level::Warn);
        assert_eq!(sent[0].title, "磁盘告警");
    }

    #[tokio::test]
    async fn test_empty_title_and_content_rejected() {
        let mut mock = MockChannelNotifier::new();
        mock.expect_channel().return_const(Channel::Lark);
        mock.expect_submit().never();

        let manager = NotifyManager::builder().register(mock).build().unwrap();
        let result = manager.info("u_001", "", "", &[]).await;
        assert!(matches!(result, Err(NotifyError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn test_fan_out_shares_message_id() {
        let lark = Sent::default();
        let bark = Sent::default();
        let manager = NotifyManager::builder()
            .register(recording(Channel::Lark, lark.clone()))
            .register(recording(Channel::Bark, bark.clone()))
            .build()
            .unwrap();

        let id = manager
            .error("u_001", "部署失败", "rollback", &[Channel::Lark, Channel::Bark])
            .await
            .unwrap();

        assert_eq!(lark.lock()[0].id, id);
        assert_eq!(bark.lock()[0].id, id);
        assert_eq!(lark.lock()[0].level, Level::Error);
        assert_eq!(bark.lock()[0].recipient, "u_001");
    }

    #[tokio::test]
    async fn test_channel_failures_not_returned() {
        let sent = Sent::default();
        let manager = NotifyManager::builder()
            .register(failing(Channel::Lark))
            .register(recording(Channel::Email, sent.clone()))
            .build()
            .unwrap();

        // lark 提交失败、telegram 未启用，都不影响 email
        let result = manager
            .success(
                "",
                "",
                "nightly job done",
                &[Channel::Lark, Channel::Telegram, Channel::Email],
            )
            .await;

        assert_ok!(result);
        assert_eq!(sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_level_helpers() {
        let sent = Sent::default();
        let manager = NotifyManager::builder()
            .register(recording(Channel::Lark, sent.clone()))
            .build()
            .unwrap();

        manager.info("", "t", "c", &[]).await.unwrap();
        manager.success("", "t", "c", &[]).await.unwrap();
        manager.error("", "t", "c", &[]).await.unwrap();
        manager.warn("", "t", "c", &[]).await.unwrap();

        let levels: Vec<_> = sent.lock().iter().map(|n| n.level).collect();
        assert_eq!(
            levels,
            vec![Level::Info, Level::Success, Level::Error, Level::Warn]
        );

        // 每次发送生成新的消息 ID
        let ids: std::collections::HashSet<_> = sent.lock().iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn test_close_closes_every_channel() {
        let mut lark = MockChannelNotifier::new();
        lark.expect_channel().return_const(Channel::Lark);
        lark.expect_close().times(1).returning(|| ());
        let mut email = MockChannelNotifier::new();
        email.expect_channel().return_const(Channel::Email);
        email.expect_close().times(1).returning(|| ());

        let manager = NotifyManager::builder()
            .register(lark)
            .register(email)
            .build()
            .unwrap();
        manager.close().await;
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let result = NotifyManager::builder()
            .register(recording(Channel::Lark, Sent::default()))
            .register(recording(Channel::Lark, Sent::default()))
            .build();
        assert!(matches!(result, Err(NotifyError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_default_channel_must_be_registered() {
        let result = NotifyManager::builder()
            .default_channel(Channel::DingTalk)
            .register(recording(Channel::Lark, Sent::default()))
            .build();
        assert!(matches!(result, Err(NotifyError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_start_propagates_channel_error() {
        let mut mock = MockChannelNotifier::new();
        mock.expect_channel().return_const(Channel::Lark);
        mock.expect_start()
            .returning(|| Err(NotifyError::ChannelDisabled {
                channel: "lark".to_string(),
            }));

        let result = NotifyManager::builder().register(mock).start();
        assert_err!(result.map(|_| ()));
    }

    #[test]
    fn test_from_config_skips_disabled_lark() {
        let builder = NotifyManagerBuilder::from_config(&AppConfig::default()).unwrap();
        // 未注册任何渠道，默认渠道无法解析
        assert!(builder.build().is_err());
    }
}
