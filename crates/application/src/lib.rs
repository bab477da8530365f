//! 应用层实现。
//!
//! 这里提供在线状态登记、连接会话、事件中继以及会话查询等用例，
//! 并定义对外部协作方（消息存储、用户资料、身份校验）的抽象。

pub mod clock;
pub mod dto;
pub mod error;
pub mod events;
pub mod hub;
pub mod identity;
pub mod memory;
pub mod presence;
pub mod relay;
pub mod repository;
pub mod services;
pub mod session;

pub use clock::{Clock, FixedClock, SystemClock};
pub use dto::{ConversationDto, MessageDto, ParticipantDto};
pub use error::ApplicationError;
pub use events::{AuthenticateData, ClientEvent, PresenceChange, ServerEvent};
pub use hub::{ConnectionHub, EventReceiver, EventSender};
pub use identity::{ChannelAuthenticator, IdentityVerifier};
pub use presence::PresenceRegistry;
pub use relay::MessageRelay;
pub use repository::{MessageStore, UserDirectory};
pub use services::{
    ConversationService, ConversationServiceDependencies, CreateMessageRequest, HISTORY_LIMIT,
};
pub use session::{ConnectionSession, SessionState};
