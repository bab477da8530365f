//! 会话聚合规则
//!
//! 按对方用户分组，每组保留最新的一条消息。创建时间相同时按存储插入
//! 序号倒序，先遇到的记录胜出。

use std::cmp::Reverse;
use std::collections::HashSet;

use crate::message::MessageRecord;
use crate::value_objects::UserId;

/// 返回消息中相对 `user_id` 的另一方。
pub fn counterpart_of<'a>(record: &'a MessageRecord, user_id: &UserId) -> &'a UserId {
    if &record.sender_id == user_id {
        &record.receiver_id
    } else {
        &record.sender_id
    }
}

/// 计算 `user_id` 与每个对方的最后一条消息，结果按时间倒序。
pub fn latest_per_counterpart<I>(user_id: &UserId, records: I) -> Vec<MessageRecord>
where
    I: IntoIterator<Item = MessageRecord>,
{
    let mut involved: Vec<MessageRecord> = records
        .into_iter()
        .filter(|record| record.involves(user_id))
        .collect();
    involved.sort_by_key(|record| Reverse((record.created_at, record.sequence)));

    let mut seen = HashSet::new();
    involved
        .into_iter()
        .filter(|record| seen.insert(counterpart_of(record, user_id).clone()))
        .collect()
}
