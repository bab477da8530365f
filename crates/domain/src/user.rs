use crate::value_objects::UserId;

/// 外部用户资料服务提供的展示字段。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub avatar: String,
}

impl UserProfile {
    pub fn new(id: UserId, username: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            avatar: avatar.into(),
        }
    }
}
