//! 事件中继
//!
//! 依据在线状态把聊天、输入中、在线变化和已读回执推送到一个或多个连接。
//! 目标不在线是正常情况，静默丢弃，不返回错误。

use std::sync::Arc;

use domain::{ConnectionId, UserId};
use serde_json::{Map, Value};
use tracing::debug;

use crate::clock::Clock;
use crate::events::{PresenceChange, ServerEvent};
use crate::hub::ConnectionHub;
use crate::presence::PresenceRegistry;

pub struct MessageRelay {
    presence: Arc<PresenceRegistry>,
    hub: Arc<ConnectionHub>,
    clock: Arc<dyn Clock>,
}

impl MessageRelay {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        hub: Arc<ConnectionHub>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            presence,
            hub,
            clock,
        }
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// 向所有连接（包括发起者）广播 `userOnline` / `userOffline`
    pub fn broadcast_presence(&self, user_id: &UserId, handle: ConnectionId, online: bool) -> usize {
        let change = PresenceChange {
            user_id: user_id.clone(),
            connection_id: handle,
        };
        let event = if online {
            ServerEvent::UserOnline(change)
        } else {
            ServerEvent::UserOffline(change)
        };
        self.hub.broadcast(event)
    }

    /// 临时聊天：附加发送者与服务端时间后广播给所有连接，包括发送者
    pub fn broadcast_chat(&self, user_id: &UserId, payload: Value) -> usize {
        let timestamp = self.clock.now().to_rfc3339();
        let data = with_fields(
            payload,
            [
                ("userId", Value::String(user_id.to_string())),
                ("timestamp", Value::String(timestamp)),
            ],
        );
        self.hub.broadcast(ServerEvent::Message(data))
    }

    /// 输入中提示：发给除发送者外的所有连接；未认证时 userId 为 null
    pub fn relay_typing(
        &self,
        from: ConnectionId,
        user_id: Option<&UserId>,
        payload: Value,
    ) -> usize {
        let sender = user_id
            .map(|id| Value::String(id.to_string()))
            .unwrap_or(Value::Null);
        let data = with_fields(payload, [("userId", sender)]);
        self.hub.broadcast_except(from, ServerEvent::UserTyping(data))
    }

    /// 定向投递给某个用户的一个在线连接；不在线时丢弃并返回 false
    pub fn deliver_to_user(&self, user_id: &UserId, event: ServerEvent) -> bool {
        let Some(handle) = self.presence.find_handle_for_identity(user_id) else {
            debug!(user_id = %user_id, event = event.name(), "recipient offline, event dropped");
            return false;
        };
        let delivered = self.hub.send_to(handle, event);
        if !delivered {
            debug!(user_id = %user_id, connection_id = %handle, "recipient connection gone");
        }
        delivered
    }

    /// 只发给指定连接
    pub fn send_to_connection(&self, handle: ConnectionId, event: ServerEvent) -> bool {
        self.hub.send_to(handle, event)
    }
}

/// 把服务端字段合并进客户端载荷，服务端字段优先。非对象载荷放入 `content`
fn with_fields<const N: usize>(payload: Value, fields: [(&str, Value); N]) -> Value {
    let mut object = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("content".to_owned(), other);
            map
        }
    };
    for (key, value) in fields {
        object.insert(key.to_owned(), value);
    }
    Value::Object(object)
}
