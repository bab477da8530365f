use std::fmt;
use std::str::FromStr;

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{MessageContent, MessageId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            other => Err(DomainError::invalid_argument(
                "message_type",
                format!("unsupported type `{other}`"),
            )),
        }
    }
}

/// 待持久化的私信，id / 时间戳 / 插入序号由存储分配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
    pub message_type: MessageType,
    pub file_url: Option<String>,
}

/// 已持久化的私信记录。
///
/// 除 `read_at` 外不可变；`read_at` 只能从空变为具体时间一次。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
    /// 存储插入序号，用于相同创建时间下的排序
    #[serde(skip)]
    pub sequence: i64,
}

impl MessageRecord {
    pub fn from_new(
        id: MessageId,
        message: NewMessage,
        created_at: Timestamp,
        sequence: i64,
    ) -> Self {
        Self {
            id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            message_type: message.message_type,
            file_url: message.file_url,
            read_at: None,
            created_at,
            sequence,
        }
    }

    pub fn involves(&self, user_id: &UserId) -> bool {
        &self.sender_id == user_id || &self.receiver_id == user_id
    }

    pub fn mark_read(&mut self, at: Timestamp) -> DomainResult<()> {
        if self.read_at.is_some() {
            return Err(DomainError::AlreadyRead);
        }
        self.read_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn record() -> MessageRecord {
        MessageRecord::from_new(
            MessageId::from(Uuid::new_v4()),
            NewMessage {
                sender_id: UserId::parse("alice").unwrap(),
                receiver_id: UserId::parse("bob").unwrap(),
                content: MessageContent::new("hi").unwrap(),
                message_type: MessageType::Text,
                file_url: None,
            },
            Utc::now(),
            1,
        )
    }

    #[test]
    fn read_timestamp_is_set_once() {
        let mut message = record();
        assert!(message.read_at.is_none());

        let first = Utc::now();
        message.mark_read(first).unwrap();
        assert_eq!(message.read_at, Some(first));

        let err = message.mark_read(first + Duration::seconds(5)).unwrap_err();
        assert_eq!(err, DomainError::AlreadyRead);
        assert_eq!(message.read_at, Some(first));
    }

    #[test]
    fn message_type_parses_known_tags_only() {
        assert_eq!("image".parse::<MessageType>().unwrap(), MessageType::Image);
        assert_eq!(MessageType::default(), MessageType::Text);
        assert!("video".parse::<MessageType>().is_err());
    }

    #[test]
    fn involves_both_parties() {
        let message = record();
        assert!(message.involves(&UserId::parse("alice").unwrap()));
        assert!(message.involves(&UserId::parse("bob").unwrap()));
        assert!(!message.involves(&UserId::parse("carol").unwrap()));
    }
}
