use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("authentication failed")]
    Authentication,
    #[error("validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("message not found")]
    NotFound,
    #[error("store error: {0}")]
    Store(RepositoryError),
}

impl ApplicationError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ApplicationError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidArgument { field, reason } => {
                ApplicationError::Validation { field, reason }
            }
            // 已读消息与不存在的消息在这一层不做区分
            DomainError::AlreadyRead => ApplicationError::NotFound,
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => ApplicationError::NotFound,
            other => ApplicationError::Store(other),
        }
    }
}
