//! 应用服务模块

pub mod conversation_service;

pub use conversation_service::{
    ConversationService, ConversationServiceDependencies, CreateMessageRequest, HISTORY_LIMIT,
};
