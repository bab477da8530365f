//! 持久连接上的事件定义
//!
//! 帧格式为 `{"event": "<name>", "data": <payload>}`。

use domain::{ConnectionId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dto::MessageDto;

/// 客户端发往服务端的事件
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Authenticate(AuthenticateData),
    /// 临时聊天广播，不持久化
    Message(Value),
    Typing(Value),
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// `authenticate` 事件携带的身份：签名令牌或裸用户标识
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AuthenticateData {
    Token { token: String },
    Identity(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChange {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
}

/// 服务端推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    OnlineUsers(Vec<UserId>),
    UserOnline(PresenceChange),
    UserOffline(PresenceChange),
    Message(Value),
    UserTyping(Value),
    NewMessage(MessageDto),
    MessageRead(MessageDto),
    Error(String),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers(_) => "onlineUsers",
            ServerEvent::UserOnline(_) => "userOnline",
            ServerEvent::UserOffline(_) => "userOffline",
            ServerEvent::Message(_) => "message",
            ServerEvent::UserTyping(_) => "userTyping",
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::MessageRead(_) => "messageRead",
            ServerEvent::Error(_) => "error",
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        ServerEvent::Error(reason.into())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
