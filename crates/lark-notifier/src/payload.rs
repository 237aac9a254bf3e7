//! 请求体构造
//!
//! 机器人 webhook 与应用消息接口对同一种消息类型的请求体格式不同：
//! webhook 的 content 是 JSON 对象，交互卡片单独放在 `card` 字段中（序列化后的字符串）；
//! 应用接口的 content 统一是序列化后的 JSON 字符串。

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::LarkError;
use crate::message::MessageContent;

/// 构造机器人 webhook 请求体
///
/// webhook 只支持 text、post、share_chat、image、interactive 五种类型。
pub fn webhook_body(channel: &str, content: &MessageContent) -> Result<Value, LarkError> {
    let msg_type = content.message_type();
    let body = match content {
        MessageContent::Text(text) => json!({ "msg_type": msg_type, "content": { "text": text } }),
        MessageContent::Post(post) => json!({ "msg_type": msg_type, "content": { "post": post } }),
        MessageContent::ShareChat(chat_id) => {
            json!({ "msg_type": msg_type, "content": { "share_chat_id": chat_id } })
        }
        MessageContent::Image(image_key) => {
            json!({ "msg_type": msg_type, "content": { "image_key": image_key } })
        }
        MessageContent::Interactive(card) => {
            json!({ "msg_type": msg_type, "card": to_json_string(card)? })
        }
        _ => {
            return Err(LarkError::UnsupportedMessageType {
                channel: channel.to_string(),
                msg_type: msg_type.to_string(),
            });
        }
    };
    Ok(body)
}

/// 构造应用消息请求体
pub fn app_body(recipient: &str, content: &MessageContent) -> Result<Value, LarkError> {
    let content_json = match content {
        MessageContent::Text(text) => json!({ "text": text }),
        MessageContent::Image(image_key) => json!({ "image_key": image_key }),
        MessageContent::Audio(file_key)
        | MessageContent::File(file_key)
        | MessageContent::Media(file_key)
        | MessageContent::Sticker(file_key) => json!({ "file_key": file_key }),
        MessageContent::ShareChat(chat_id) => json!({ "chat_id": chat_id }),
        MessageContent::ShareUser(user_id) => json!({ "user_id": user_id }),
        MessageContent::Post(value)
        | MessageContent::Interactive(value)
        | MessageContent::System(value) => value.clone(),
    };

    Ok(json!({
        "receive_id": recipient,
        "msg_type": content.message_type(),
        "content": to_json_string(&content_json)?,
    }))
}

/// 构造模板卡片内容
pub fn template_card(template_id: &str, variables: Value) -> Value {
    json!({
        "type": "template",
        "data": {
            "template_id": template_id,
            "template_variable": variables,
        }
    })
}

fn to_json_string(value: &Value) -> Result<String, LarkError> {
    serde_json::to_string(value)
        .map_err(|e| LarkError::InvalidParams(format!("消息内容序列化失败: {e}")))
}

/// 发送接口的业务响应，code 为 0 表示成功
#[derive(Debug, Deserialize)]
pub struct SendResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
}

impl SendResponse {
    pub fn into_result(self, channel: &str) -> Result<(), LarkError> {
        if self.code == 0 {
            return Ok(());
        }
        Err(LarkError::Delivery {
            channel: channel.to_string(),
            code: self.code,
            message: self.msg,
        })
    }
}
