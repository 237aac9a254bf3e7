//! 飞书/Lark 通知渠道
//!
//! 支持两种投递方式：机器人 webhook 与应用消息接口。
//! 消息经有界队列进入固定大小的 worker 池异步发送，
//! 应用令牌按有效期缓存，触发限流时按服务端给出的时间等待重试。

pub mod card;
pub mod cli;
pub mod credential;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod payload;
pub mod request;
pub mod target;

#[cfg(test)]
pub(crate) mod testing;

pub use card::{CardRenderer, CardTemplate};
pub use credential::{Credential, TokenResolver};
pub use dispatcher::{DispatcherState, LarkDispatcher, SendReceipt, SendResult};
pub use error::LarkError;
pub use message::{Level, Message, MessageContent};
pub use request::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
pub use target::{AppType, LarkAppConfig, LarkConfig};
