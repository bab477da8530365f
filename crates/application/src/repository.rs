use async_trait::async_trait;
use domain::{MessageId, MessageRecord, NewMessage, RepositoryError, Timestamp, UserId, UserProfile};

/// 持久化消息存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    // 保存消息，由存储分配 id、创建时间和插入序号
    async fn create(&self, message: NewMessage) -> Result<MessageRecord, RepositoryError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<MessageRecord>, RepositoryError>;

    // 双方之间的消息，按创建时间倒序，最多 limit 条
    async fn find_between(
        &self,
        user_id: &UserId,
        counterpart_id: &UserId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError>;

    // 原子地设置已读时间；仅匹配 id、接收者一致且尚未读的消息
    async fn mark_read(
        &self,
        id: MessageId,
        reader_id: &UserId,
        at: Timestamp,
    ) -> Result<Option<MessageRecord>, RepositoryError>;

    // 每个对方的最后一条消息
    async fn latest_per_counterpart(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<MessageRecord>, RepositoryError>;
}

/// 外部用户资料服务，只读
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_profiles(&self, ids: &[UserId]) -> Result<Vec<UserProfile>, RepositoryError>;
}
