//! 单个持久连接的会话状态机
//!
//! `Unauthenticated -> Authenticated -> Closed`，关闭后不可恢复。
//! 同一连接上的事件按接收顺序逐个处理。关闭流程（注销在线状态、广播离线）
//! 每个连接恰好执行一次：显式 `close` 与 `Drop` 共用同一个守卫。

use std::sync::Arc;

use domain::{ConnectionId, UserId};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::events::{AuthenticateData, ClientEvent, ServerEvent};
use crate::hub::EventSender;
use crate::identity::ChannelAuthenticator;
use crate::relay::MessageRelay;

pub const NOT_AUTHENTICATED: &str = "not authenticated";
pub const AUTHENTICATION_FAILED: &str = "authentication failed";
pub const INVALID_EVENT: &str = "invalid event";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(UserId),
    Closed,
}

pub struct ConnectionSession {
    handle: ConnectionId,
    state: SessionState,
    relay: Arc<MessageRelay>,
    authenticator: Arc<ChannelAuthenticator>,
}

impl ConnectionSession {
    /// 新连接：登记到订阅集合，初始为未认证
    pub fn open(
        relay: Arc<MessageRelay>,
        authenticator: Arc<ChannelAuthenticator>,
        sender: EventSender,
    ) -> Self {
        let handle = ConnectionId::generate();
        relay.hub().attach(handle, sender);
        info!(connection_id = %handle, "connection opened");

        Self {
            handle,
            state: SessionState::Unauthenticated,
            relay,
            authenticator,
        }
    }

    pub fn handle(&self) -> ConnectionId {
        self.handle
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&UserId> {
        match &self.state {
            SessionState::Authenticated(user_id) => Some(user_id),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// 解析并处理一帧文本；格式错误只回复本连接一个 error 事件
    pub fn handle_text(&mut self, text: &str) {
        match ClientEvent::parse(text) {
            Ok(event) => self.handle_event(event),
            Err(err) => {
                warn!(connection_id = %self.handle, error = %err, "malformed channel frame");
                self.reject(INVALID_EVENT);
            }
        }
    }

    pub fn handle_event(&mut self, event: ClientEvent) {
        if self.is_closed() {
            return;
        }
        match event {
            ClientEvent::Authenticate(data) => self.authenticate_with(data),
            ClientEvent::Message(payload) => self.send_chat(payload),
            ClientEvent::Typing(payload) => self.typing(payload),
        }
    }

    fn authenticate_with(&mut self, data: AuthenticateData) {
        match self.authenticator.resolve(data) {
            Ok(user_id) => self.authenticate(user_id),
            Err(err) => {
                warn!(connection_id = %self.handle, error = %err, "channel authentication rejected");
                self.reject(AUTHENTICATION_FAILED);
            }
        }
    }

    /// 绑定身份。已认证的连接再次认证视为幂等的重新认证
    pub fn authenticate(&mut self, user_id: UserId) {
        if self.is_closed() {
            return;
        }
        let presence = self.relay.presence();
        presence.register(self.handle, user_id.clone());
        self.state = SessionState::Authenticated(user_id.clone());
        info!(connection_id = %self.handle, user_id = %user_id, "connection authenticated");

        self.relay.broadcast_presence(&user_id, self.handle, true);
        self.relay.send_to_connection(
            self.handle,
            ServerEvent::OnlineUsers(presence.online_identities()),
        );
    }

    /// 临时聊天广播；未认证时只回复 error，不做其他处理
    pub fn send_chat(&mut self, payload: Value) {
        let Some(user_id) = self.identity().cloned() else {
            self.reject(NOT_AUTHENTICATED);
            return;
        };
        self.relay.broadcast_chat(&user_id, payload);
    }

    /// 输入中提示不要求认证
    pub fn typing(&self, payload: Value) {
        if self.is_closed() {
            return;
        }
        self.relay.relay_typing(self.handle, self.identity(), payload);
    }

    pub fn reject(&self, reason: &str) {
        self.relay
            .send_to_connection(self.handle, ServerEvent::error(reason));
    }

    /// 关闭连接：注销在线状态，如有绑定身份则广播离线。重复调用无效果
    pub fn close(&mut self) -> Option<UserId> {
        if self.is_closed() {
            return None;
        }
        self.state = SessionState::Closed;
        self.relay.hub().detach(self.handle);

        let user_id = self.relay.presence().unregister(self.handle);
        match &user_id {
            Some(id) => {
                self.relay.broadcast_presence(id, self.handle, false);
                info!(connection_id = %self.handle, user_id = %id, "connection closed");
            }
            None => debug!(connection_id = %self.handle, "unauthenticated connection closed"),
        }
        user_id
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}
