//! 连接订阅集合
//!
//! 每个存活连接（无论是否已认证）在这里登记一个发送端。广播就是对这个
//! 集合的显式遍历；"包含发送者" 与 "排除发送者" 是两个独立的操作。

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use domain::ConnectionId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::ServerEvent;

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

#[derive(Debug, Default)]
pub struct ConnectionHub {
    senders: RwLock<HashMap<ConnectionId, EventSender>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, EventSender>> {
        self.senders.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attach(&self, handle: ConnectionId, sender: EventSender) {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, sender);
    }

    pub fn detach(&self, handle: ConnectionId) -> bool {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
            .is_some()
    }

    /// 发送到单个连接。目标不存在或已关闭时返回 false
    pub fn send_to(&self, handle: ConnectionId, event: ServerEvent) -> bool {
        match self.read().get(&handle) {
            Some(sender) => {
                if sender.send(event).is_err() {
                    debug!(connection_id = %handle, "connection receiver already dropped");
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// 发送给所有连接，包括发起者
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        self.fan_out(None, event)
    }

    /// 发送给除 `excluded` 之外的所有连接
    pub fn broadcast_except(&self, excluded: ConnectionId, event: ServerEvent) -> usize {
        self.fan_out(Some(excluded), event)
    }

    fn fan_out(&self, excluded: Option<ConnectionId>, event: ServerEvent) -> usize {
        let senders = self.read();
        let mut delivered = 0;
        let mut failed = 0;

        for (handle, sender) in senders.iter() {
            if Some(*handle) == excluded {
                continue;
            }
            if sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                failed += 1;
            }
        }

        if failed > 0 {
            warn!(event = event.name(), failed, "broadcast skipped closed connections");
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
