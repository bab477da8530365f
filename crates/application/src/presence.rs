//! 进程内在线状态登记表
//!
//! 维护连接句柄与已认证用户之间的双向映射，是"谁在线"的唯一来源。
//! 所有操作都在同一把锁内完成，临界区内不做任何 I/O 或 await，
//! 因此不会观察到半完成的注册/注销。进程重启后为空。

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use domain::{ConnectionId, UserId};

#[derive(Debug, Default)]
struct PresenceIndex {
    by_connection: HashMap<ConnectionId, UserId>,
    /// 按注册顺序排列，末尾是最近注册的句柄
    by_user: HashMap<UserId, Vec<ConnectionId>>,
}

impl PresenceIndex {
    fn detach(&mut self, handle: ConnectionId, user_id: &UserId) {
        if let Some(handles) = self.by_user.get_mut(user_id) {
            handles.retain(|h| *h != handle);
            if handles.is_empty() {
                self.by_user.remove(user_id);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    index: RwLock<PresenceIndex>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, PresenceIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PresenceIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 绑定句柄与用户，覆盖该句柄之前绑定的用户
    pub fn register(&self, handle: ConnectionId, user_id: UserId) {
        let mut index = self.write();
        if let Some(previous) = index.by_connection.insert(handle, user_id.clone()) {
            index.detach(handle, &previous);
        }
        index.by_user.entry(user_id).or_default().push(handle);
    }

    /// 解绑句柄，返回之前绑定的用户
    pub fn unregister(&self, handle: ConnectionId) -> Option<UserId> {
        let mut index = self.write();
        let user_id = index.by_connection.remove(&handle)?;
        index.detach(handle, &user_id);
        Some(user_id)
    }

    pub fn lookup_identity(&self, handle: ConnectionId) -> Option<UserId> {
        self.read().by_connection.get(&handle).cloned()
    }

    /// 当前在线用户快照，已去重并排序；多设备用户只出现一次
    pub fn online_identities(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.read().by_user.keys().cloned().collect();
        users.sort();
        users
    }

    /// 反查用户的一个在线句柄。
    ///
    /// 同一用户有多个句柄时返回最近注册的那个。
    pub fn find_handle_for_identity(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.read()
            .by_user
            .get(user_id)
            .and_then(|handles| handles.last().copied())
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.read().by_user.contains_key(user_id)
    }

    /// 批量判断在线状态，只加一次锁
    pub fn online_among<'a, I>(&self, user_ids: I) -> HashSet<UserId>
    where
        I: IntoIterator<Item = &'a UserId>,
    {
        let index = self.read();
        user_ids
            .into_iter()
            .filter(|id| index.by_user.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.read().by_connection.len()
    }
}
