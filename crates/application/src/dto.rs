use std::collections::HashMap;

use domain::{MessageId, MessageRecord, MessageType, Timestamp, UserId, UserProfile};
use serde::{Deserialize, Serialize};

/// 消息参与者的展示字段，`is_online` 取自实时在线状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    pub id: UserId,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub is_online: bool,
}

impl ParticipantDto {
    pub fn resolve(id: &UserId, profiles: &HashMap<UserId, UserProfile>, is_online: bool) -> Self {
        let profile = profiles.get(id);
        Self {
            id: id.clone(),
            username: profile.map(|p| p.username.clone()),
            avatar: profile.map(|p| p.avatar.clone()),
            is_online,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: MessageId,
    pub sender: ParticipantDto,
    pub receiver: ParticipantDto,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: String,
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl MessageDto {
    pub fn new(record: &MessageRecord, sender: ParticipantDto, receiver: ParticipantDto) -> Self {
        Self {
            id: record.id,
            sender,
            receiver,
            content: record.content.as_str().to_owned(),
            message_type: record.message_type,
            file_url: record.file_url.clone().unwrap_or_default(),
            read_at: record.read_at,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub counterpart_id: UserId,
    pub last_message: MessageDto,
}
