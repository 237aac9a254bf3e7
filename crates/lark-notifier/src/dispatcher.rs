//! 飞书消息分发器
//!
//! 调用方通过 `submit` 把消息放入有界队列后立即返回消息 ID，
//! 单个消费任务从队列取出消息并交给 worker 发送：
//!
//! ```text
//! submit ──► mpsc 队列 ──► 消费任务 ──► Semaphore 限流 ──► worker（JoinSet）
//!                                                          ├─ webhook
//!                                                          └─ 应用消息接口（令牌 + 重试）
//! ```
//!
//! 队列是唯一的背压点：队列满时 `submit` 等待。发送结果只记录日志和指标，
//! 需要结果的调用方使用 `submit_tracked` 获取回执。
//!
//! 生命周期：`Created → Running → Closing → Closed`。`close` 会等待已入队的消息全部发送完成。

use std::sync::Arc;

use notify_shared::cache::ExpiringCache;
use notify_shared::message_id::MessageIdGenerator;
use notify_shared::observability::metrics::{record_dispatched, record_submitted};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::card::CardRenderer;
use crate::credential::CredentialProvider;
use crate::error::LarkError;
use crate::message::{Message, MessageContent};
use crate::payload::{SendResponse, app_body, template_card, webhook_body};
use crate::request::{ApiRequest, HttpTransport, ReqwestTransport, RequestExecutor};
use crate::target::{AppTarget, ChannelTarget, LarkConfig, RoutingTable};

// ---------------------------------------------------------------------------
// 发送结果
// ---------------------------------------------------------------------------

/// 单条消息的最终发送结果
#[derive(Debug)]
pub struct SendResult {
    pub message_id: String,
    pub channel: String,
    pub result: Result<(), LarkError>,
}

impl SendResult {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// `submit_tracked` 返回的回执
#[derive(Debug)]
pub struct SendReceipt {
    message_id: String,
    channel: String,
    outcome: oneshot::Receiver<SendResult>,
}

impl SendReceipt {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// 等待 worker 发送完成
    ///
    /// 消息在发送前被丢弃（分发器未启动就关闭）时返回 `LarkError::Closed`。
    pub async fn outcome(self) -> SendResult {
        match self.outcome.await {
            Ok(result) => result,
            Err(_) => SendResult {
                message_id: self.message_id,
                channel: self.channel,
                result: Err(LarkError::Closed),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// 生命周期
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Created,
    Running,
    Closing,
    Closed,
}

enum Lifecycle {
    Created { queue: mpsc::Receiver<Envelope> },
    Running { consumer: JoinHandle<()> },
    /// 排空完成后 `drained` 变为 true
    Closing { drained: watch::Receiver<bool> },
    Closed,
}

impl Lifecycle {
    fn state(&self) -> DispatcherState {
        match self {
            Self::Created { .. } => DispatcherState::Created,
            Self::Running { .. } => DispatcherState::Running,
            Self::Closing { .. } => DispatcherState::Closing,
            Self::Closed => DispatcherState::Closed,
        }
    }
}

/// 队列中的消息，`reply` 仅在 `submit_tracked` 时存在
struct Envelope {
    message: Message,
    reply: Option<oneshot::Sender<SendResult>>,
}

// ---------------------------------------------------------------------------
// 投递
// ---------------------------------------------------------------------------

/// worker 共享的投递逻辑
struct Delivery {
    routes: RoutingTable,
    executor: RequestExecutor,
    credentials: CredentialProvider,
    max_retries: u32,
}

impl Delivery {
    async fn process(&self, envelope: Envelope) {
        let Envelope { message, reply } = envelope;
        let message_id = message.id.clone().unwrap_or_default();
        let channel = self
            .routes
            .channel_name(message.channel.as_deref())
            .to_string();
        let mode = self
            .routes
            .get(&channel)
            .map(ChannelTarget::mode)
            .unwrap_or("unknown");

        let result = self.dispatch(&message).await;
        match &result {
            Ok(()) => {
                info!(
                    message_id = %message_id,
                    channel = %channel,
                    mode,
                    msg_type = message.message_type(),
                    "飞书消息发送成功"
                );
                record_dispatched(&channel, mode, "success");
            }
            Err(e) => {
                error!(
                    message_id = %message_id,
                    channel = %channel,
                    mode,
                    code = e.code(),
                    error = %e,
                    "飞书消息发送失败"
                );
                record_dispatched(&channel, mode, "failure");
            }
        }

        if let Some(reply) = reply {
            // 回执可能已被调用方丢弃
            let _ = reply.send(SendResult {
                message_id,
                channel,
                result,
            });
        }
    }

    async fn dispatch(&self, message: &Message) -> Result<(), LarkError> {
        match self.routes.resolve(message.channel.as_deref())? {
            ChannelTarget::Webhook { name, url } => {
                self.send_webhook(name, url, &message.content).await
            }
            ChannelTarget::App(app) => {
                let recipient = message
                    .recipient
                    .as_deref()
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| LarkError::MissingRecipient {
                        channel: app.name.clone(),
                    })?;
                self.send_app(app, recipient, &message.content).await
            }
        }
    }

    #[instrument(skip(self, url, content), fields(msg_type = content.message_type()))]
    async fn send_webhook(
        &self,
        name: &str,
        url: &str,
        content: &MessageContent,
    ) -> Result<(), LarkError> {
        let body = webhook_body(name, content)?;
        let request = ApiRequest::post_json(url, body);

        let response = self.executor.execute(&request, self.max_retries).await?;
        response.json::<SendResponse>()?.into_result(name)
    }

    #[instrument(skip(self, app, content), fields(app = %app.name, msg_type = content.message_type()))]
    async fn send_app(
        &self,
        app: &AppTarget,
        recipient: &str,
        content: &MessageContent,
    ) -> Result<(), LarkError> {
        let body = app_body(recipient, content)?;
        let token = self.credentials.resolve(app).await?;
        let request = ApiRequest::post_json(app.app_type.message_url(), body)
            .with_header("Authorization", format!("Bearer {token}"))
            .with_query("receive_id_type", "user_id");

        let response = self.executor.execute(&request, self.max_retries).await?;
        response.json::<SendResponse>()?.into_result(&app.name)
    }
}

/// 队列消费循环
///
/// 每条消息先获取一个 worker 许可再派发，许可数即并发上限。
/// 队列关闭且取空后等待所有 worker 完成再退出。
async fn run_consumer(
    delivery: Arc<Delivery>,
    mut queue: mpsc::Receiver<Envelope>,
    pool_size: usize,
) {
    let permits = Arc::new(Semaphore::new(pool_size));
    let mut workers = JoinSet::new();

    while let Some(envelope) = queue.recv().await {
        while let Some(finished) = workers.try_join_next() {
            log_worker_exit(finished);
        }

        let Ok(permit) = permits.clone().acquire_owned().await else {
            error!("worker 许可已关闭，停止消费");
            break;
        };
        let delivery = delivery.clone();
        workers.spawn(async move {
            let _permit = permit;
            delivery.process(envelope).await;
        });
    }

    debug!(in_flight = workers.len(), "队列已关闭，等待进行中的消息发送完成");
    while let Some(finished) = workers.join_next().await {
        log_worker_exit(finished);
    }
    info!("飞书消息消费任务已退出");
}

fn log_worker_exit(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "发送任务异常退出");
    }
}

// ---------------------------------------------------------------------------
// LarkDispatcher
// ---------------------------------------------------------------------------

/// 飞书消息分发器
pub struct LarkDispatcher {
    delivery: Arc<Delivery>,
    cards: CardRenderer,
    ids: MessageIdGenerator,
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
    lifecycle: Mutex<Lifecycle>,
    pool_size: usize,
}

impl LarkDispatcher {
    /// 使用 reqwest 传输创建分发器
    pub fn new(config: LarkConfig) -> Result<Self, LarkError> {
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout)?);
        Self::with_transport(config, transport)
    }

    /// 使用指定的 HTTP 传输创建分发器
    pub fn with_transport(
        config: LarkConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, LarkError> {
        let routes = config.routing_table()?;
        let executor = RequestExecutor::new(transport);
        let credentials = CredentialProvider::new(
            executor.clone(),
            Arc::new(ExpiringCache::new()),
            config.max_retries,
        );
        let (sender, queue) = mpsc::channel(config.effective_channel_size());

        Ok(Self {
            delivery: Arc::new(Delivery {
                routes,
                executor,
                credentials,
                max_retries: config.max_retries,
            }),
            cards: CardRenderer::with_default_template()?,
            ids: MessageIdGenerator::new(),
            sender: Mutex::new(Some(sender)),
            lifecycle: Mutex::new(Lifecycle::Created { queue }),
            pool_size: config.effective_pool_size(),
        })
    }

    /// 替换卡片渲染器
    pub fn with_card_renderer(mut self, cards: CardRenderer) -> Self {
        self.cards = cards;
        self
    }

    pub fn state(&self) -> DispatcherState {
        self.lifecycle.lock().state()
    }

    pub fn default_channel(&self) -> &str {
        self.delivery.routes.default_channel()
    }

    /// 启动消费任务
    ///
    /// 必须在 tokio 运行时内调用。重复启动只记录警告，关闭后再启动返回 `Closed`。
    pub fn start(&self) -> Result<(), LarkError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            LarkError::InvalidConfiguration("分发器必须在 tokio 运行时内启动".to_string())
        })?;

        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
            Lifecycle::Created { queue } => {
                let consumer =
                    runtime.spawn(run_consumer(self.delivery.clone(), queue, self.pool_size));
                *lifecycle = Lifecycle::Running { consumer };
                info!(
                    pool_size = self.pool_size,
                    default_channel = %self.default_channel(),
                    "飞书消息分发器已启动"
                );
                Ok(())
            }
            running @ Lifecycle::Running { .. } => {
                *lifecycle = running;
                warn!("飞书消息分发器已在运行，忽略重复启动");
                Ok(())
            }
            other => {
                *lifecycle = other;
                Err(LarkError::Closed)
            }
        }
    }

    /// 提交消息，返回消息 ID
    ///
    /// 只校验参数和渲染卡片，发送结果不会返回给调用方。
    pub async fn submit(&self, message: Message) -> Result<String, LarkError> {
        let message = self.prepare(message)?;
        let message_id = message.id.clone().unwrap_or_default();
        self.enqueue(Envelope {
            message,
            reply: None,
        })
        .await?;
        Ok(message_id)
    }

    /// 提交消息并返回可等待发送结果的回执
    pub async fn submit_tracked(&self, message: Message) -> Result<SendReceipt, LarkError> {
        let message = self.prepare(message)?;
        let message_id = message.id.clone().unwrap_or_default();
        let channel = self
            .delivery
            .routes
            .channel_name(message.channel.as_deref())
            .to_string();

        let (reply, outcome) = oneshot::channel();
        self.enqueue(Envelope {
            message,
            reply: Some(reply),
        })
        .await?;

        Ok(SendReceipt {
            message_id,
            channel,
            outcome,
        })
    }

    /// 通过指定机器人发送
    pub async fn send_bot_message(
        &self,
        bot_name: &str,
        content: MessageContent,
    ) -> Result<String, LarkError> {
        self.submit(Message::new(content).with_channel(bot_name))
            .await
    }

    /// 通过指定应用发送给用户
    pub async fn send_app_message(
        &self,
        app_name: &str,
        recipient: &str,
        content: MessageContent,
    ) -> Result<String, LarkError> {
        self.submit(
            Message::new(content)
                .with_channel(app_name)
                .with_recipient(recipient),
        )
        .await
    }

    /// 通过指定应用发送平台模板卡片
    pub async fn send_template_card(
        &self,
        app_name: &str,
        template_id: &str,
        recipient: &str,
        variables: Value,
    ) -> Result<String, LarkError> {
        let content = MessageContent::Interactive(template_card(template_id, variables));
        self.send_app_message(app_name, recipient, content).await
    }

    /// 获取应用当前的访问令牌
    pub async fn token(&self, app_name: &str) -> Result<String, LarkError> {
        match self.delivery.routes.get(app_name) {
            Some(ChannelTarget::App(app)) => self.delivery.credentials.resolve(app).await,
            _ => Err(LarkError::ChannelNotFound {
                channel: app_name.to_string(),
            }),
        }
    }

    /// 关闭分发器
    ///
    /// 停止接收新消息，等待已入队的消息全部发送完成。
    /// 从未启动过的分发器直接丢弃队列中的消息。
    /// 并发调用时，后到的调用方同样等待排空结束后才返回。
    pub async fn close(&self) {
        drop(self.sender.lock().take());

        let (done, drained) = watch::channel(false);
        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            match &*lifecycle {
                Lifecycle::Closed => return,
                Lifecycle::Closing { drained: pending } => Err(pending.clone()),
                _ => Ok(std::mem::replace(
                    &mut *lifecycle,
                    Lifecycle::Closing { drained },
                )),
            }
        };
        let previous = match previous {
            Ok(previous) => previous,
            Err(mut drained) => {
                // 发送端只会在排空结束后释放，出错同样说明已关闭
                let _ = drained.wait_for(|finished| *finished).await;
                return;
            }
        };

        match previous {
            Lifecycle::Running { consumer } => {
                if let Err(e) = consumer.await {
                    error!(error = %e, "飞书消息消费任务异常退出");
                }
            }
            Lifecycle::Created { mut queue } => {
                queue.close();
                let mut discarded = 0usize;
                while queue.try_recv().is_ok() {
                    discarded += 1;
                }
                if discarded > 0 {
                    warn!(discarded, "分发器未启动，丢弃队列中的消息");
                }
            }
            Lifecycle::Closing { .. } | Lifecycle::Closed => {}
        }

        *self.lifecycle.lock() = Lifecycle::Closed;
        done.send_replace(true);
        info!("飞书消息分发器已关闭");
    }

    fn prepare(&self, mut message: Message) -> Result<Message, LarkError> {
        if message.is_blank() {
            return Err(LarkError::InvalidParams(
                "消息标题和内容不能同时为空".to_string(),
            ));
        }

        if message.id.as_deref().is_none_or(str::is_empty) {
            message.id = Some(self.ids.next_id());
        }

        if message.wants_card() {
            if let MessageContent::Text(text) = &message.content {
                let title = message.title.as_deref().unwrap_or_default();
                let card = self.cards.render(message.level, title, text)?;
                message.content = MessageContent::Interactive(card);
            }
        }

        Ok(message)
    }

    async fn enqueue(&self, envelope: Envelope) -> Result<(), LarkError> {
        let sender = self.sender.lock().clone().ok_or(LarkError::Closed)?;
        let channel = self
            .delivery
            .routes
            .channel_name(envelope.message.channel.as_deref())
            .to_string();

        sender.send(envelope).await.map_err(|_| LarkError::Closed)?;
        record_submitted(&channel);
        Ok(())
    }
}
