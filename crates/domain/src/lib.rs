//! 私信中继系统核心领域模型
//!
//! 包含用户标识、连接句柄、私信记录等核心类型，以及会话聚合规则。

pub mod conversation;
pub mod errors;
pub mod message;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use conversation::{counterpart_of, latest_per_counterpart};
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{MessageRecord, MessageType, NewMessage};
pub use user::UserProfile;
pub use value_objects::{ConnectionId, MessageContent, MessageId, Timestamp, UserId};
